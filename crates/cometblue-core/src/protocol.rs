//! Byte layouts of the Comet Blue characteristics.
//!
//! Every characteristic carries a small fixed-width payload. Decoders check
//! the payload length before touching any byte; encoders validate that the
//! typed value fits the device's resolution.
//!
//! | characteristic | bytes | layout |
//! |---|---|---|
//! | temperature | 7 | current, manual, low, high, offset (i8 half-degrees), window, window minutes |
//! | datetime | 5 | minute, hour, day, month, year − 2000 |
//! | weekday | 8 | start/end slot pairs, `hour * 6 + minute / 10`, `0xFF` unset |
//! | holiday | 9 | start hour, day, month, year; end hour, day, month, year; temperature |
//! | settings | 3 | status flags; `0x80` leaves a byte unchanged on write |
//! | battery | 1 | percent, `0xFF` unknown |
//! | pin | 4 | u32 little-endian |

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;

use crate::types::{
    DaySchedule, DeviceStatus, HeatingPeriod, Holiday, Pin, Temperature, TemperatureReading,
    TemperatureUpdate, PERIODS_PER_DAY,
};

/// Marker byte that tells the valve to keep the current value.
pub const UNCHANGED_VALUE: u8 = 0x80;

/// Signed marker that tells the valve to keep the current temperature.
pub const UNCHANGED_TEMP: i8 = i8::MIN;

/// Time slot value of an unused schedule entry.
pub const NO_TIME: u8 = 0xFF;

/// Payload that clears a holiday register.
pub const NO_HOLIDAY: [u8; HOLIDAY_LEN] = [UNCHANGED_VALUE; HOLIDAY_LEN];

/// Window byte reported while an open window is detected.
pub const WINDOW_OPEN: u8 = 0xF0;

/// Battery byte reported when the level is unknown.
pub const BATTERY_UNKNOWN: u8 = 0xFF;

/// Lowest holiday setpoint the valve accepts, in °C.
pub const HOLIDAY_MIN_CELSIUS: f32 = 8.0;

/// Holiday setpoints must stay below this value, in °C.
pub const HOLIDAY_MAX_CELSIUS: f32 = 29.0;

const TEMPERATURE_LEN: usize = 7;
const DATETIME_LEN: usize = 5;
const WEEKDAY_LEN: usize = 2 * PERIODS_PER_DAY;
const HOLIDAY_LEN: usize = 9;
const SETTINGS_LEN: usize = 3;
const BATTERY_LEN: usize = 1;

/// Slots per hour in the schedule encoding.
const SLOTS_PER_HOUR: u32 = 6;
const MINUTES_PER_SLOT: u32 = 10;
const SLOTS_PER_DAY: u8 = 24 * 6;

const YEAR_BASE: i32 = 2000;
const YEAR_LAST: i32 = 2099;

/// Errors raised while encoding or decoding characteristic payloads.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// A payload read from the device has the wrong size.
    #[error("Invalid {characteristic} payload: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Characteristic name.
        characteristic: &'static str,
        /// Expected payload size.
        expected: usize,
        /// Actual payload size.
        actual: usize,
    },

    /// PIN with more than 8 digits.
    #[error("PIN {0} is too long. Up to 8 digits are allowed.")]
    InvalidPin(u32),

    /// Temperature not representable in 0.5 °C steps.
    #[error("Temperature {0} °C is not a multiple of 0.5 within -63.5..=63.5")]
    InvalidTemperature(f32),

    /// Schedule time slot outside the day.
    #[error("Invalid schedule time slot {0:#04x}")]
    InvalidTimeSlot(u8),

    /// Schedule time not on a 10 minute boundary.
    #[error("Schedule time {0} is not on a 10 minute boundary")]
    UnalignedTime(NaiveTime),

    /// More heating periods than the device has slots for.
    #[error("At most 4 heating periods per day are supported (got {0})")]
    TooManyPeriods(usize),

    /// Date/time bytes that do not form a calendar date.
    #[error("Device returned an invalid date/time: {0:02x?}")]
    InvalidDateTime([u8; DATETIME_LEN]),

    /// Year the device cannot store.
    #[error("Year {0} is outside the supported range 2000..=2099")]
    YearOutOfRange(i32),

    /// Holiday that ends before it starts.
    #[error("Holiday must end after it starts ({start} .. {end})")]
    InvalidHolidayRange {
        /// Holiday start.
        start: NaiveDateTime,
        /// Holiday end.
        end: NaiveDateTime,
    },

    /// Holiday setpoint outside the range the valve accepts.
    #[error("Holiday temperature {0} °C must be at least 8.0 and below 29.0")]
    HolidayTemperatureOutOfRange(f32),

    /// Holiday register index out of range.
    #[error("Holiday slot {0} does not exist. Valid slots are 0-7.")]
    InvalidHolidaySlot(u8),
}

impl ProtocolError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidLength { .. } => "INVALID_PAYLOAD_LENGTH",
            Self::InvalidPin(_) => "INVALID_PIN",
            Self::InvalidTemperature(_) => "INVALID_TEMPERATURE",
            Self::InvalidTimeSlot(_) => "INVALID_TIME_SLOT",
            Self::UnalignedTime(_) => "UNALIGNED_TIME",
            Self::TooManyPeriods(_) => "TOO_MANY_PERIODS",
            Self::InvalidDateTime(_) => "INVALID_DATETIME",
            Self::YearOutOfRange(_) => "YEAR_OUT_OF_RANGE",
            Self::InvalidHolidayRange { .. } => "INVALID_HOLIDAY_RANGE",
            Self::HolidayTemperatureOutOfRange(_) => "HOLIDAY_TEMPERATURE_OUT_OF_RANGE",
            Self::InvalidHolidaySlot(_) => "INVALID_HOLIDAY_SLOT",
        }
    }
}

type Result<T> = std::result::Result<T, ProtocolError>;

fn fixed<const N: usize>(characteristic: &'static str, value: &[u8]) -> Result<[u8; N]> {
    value.try_into().map_err(|_| ProtocolError::InvalidLength {
        characteristic,
        expected: N,
        actual: value.len(),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode_year(year: i32) -> Result<u8> {
    if !(YEAR_BASE..=YEAR_LAST).contains(&year) {
        return Err(ProtocolError::YearOutOfRange(year));
    }
    Ok((year - YEAR_BASE) as u8)
}

fn decode_date_hour(hour: u8, day: u8, month: u8, year: u8) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(YEAR_BASE + i32::from(year), month.into(), day.into())?
        .and_hms_opt(hour.into(), 0, 0)
}

// ============================================================================
// PIN
// ============================================================================

/// PIN payload.
#[must_use]
pub const fn encode_pin(pin: Pin) -> [u8; 4] {
    pin.value().to_le_bytes()
}

// ============================================================================
// TEMPERATURE
// ============================================================================

/// Decode the temperature characteristic.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] unless the payload has 7 bytes.
#[allow(clippy::cast_possible_wrap)]
pub fn decode_temperatures(value: &[u8]) -> Result<TemperatureReading> {
    let [current, manual, low, high, offset, window, minutes] =
        fixed::<TEMPERATURE_LEN>("temperature", value)?;
    let t = |b: u8| Temperature::from_half_degrees(b as i8);

    Ok(TemperatureReading {
        current: t(current),
        manual: t(manual),
        target_low: t(low),
        target_high: t(high),
        offset: t(offset),
        window_open: window == WINDOW_OPEN,
        window_open_minutes: minutes,
    })
}

/// Encode a temperature update. The measured temperature and the window
/// settings are always left unchanged.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn encode_temperature_update(update: &TemperatureUpdate) -> [u8; TEMPERATURE_LEN] {
    let t = |v: Option<Temperature>| v.map_or(UNCHANGED_TEMP, Temperature::half_degrees) as u8;
    [
        UNCHANGED_TEMP as u8,
        t(update.manual),
        t(update.target_low),
        t(update.target_high),
        t(update.offset),
        UNCHANGED_VALUE,
        UNCHANGED_VALUE,
    ]
}

// ============================================================================
// DATE/TIME
// ============================================================================

/// Decode the device clock.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] or, for bytes that do not form a
/// valid date and time, [`ProtocolError::InvalidDateTime`].
pub fn decode_datetime(value: &[u8]) -> Result<NaiveDateTime> {
    let raw = fixed::<DATETIME_LEN>("datetime", value)?;
    let [minute, hour, day, month, year] = raw;
    NaiveDate::from_ymd_opt(YEAR_BASE + i32::from(year), month.into(), day.into())
        .and_then(|date| date.and_hms_opt(hour.into(), minute.into(), 0))
        .ok_or(ProtocolError::InvalidDateTime(raw))
}

/// Encode the device clock. Seconds are dropped.
///
/// # Errors
///
/// Returns [`ProtocolError::YearOutOfRange`] outside 2000..=2099.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_datetime(value: &NaiveDateTime) -> Result<[u8; DATETIME_LEN]> {
    Ok([
        value.minute() as u8,
        value.hour() as u8,
        value.day() as u8,
        value.month() as u8,
        encode_year(value.year())?,
    ])
}

// ============================================================================
// WEEKLY SCHEDULE
// ============================================================================

/// Decode one schedule time slot; `None` for an unused slot.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidTimeSlot`] for values past the end of the day.
pub fn decode_time_slot(value: u8) -> Result<Option<NaiveTime>> {
    if value == NO_TIME {
        return Ok(None);
    }
    if value >= SLOTS_PER_DAY {
        return Err(ProtocolError::InvalidTimeSlot(value));
    }
    let slot = u32::from(value);
    let time = NaiveTime::from_hms_opt(
        slot / SLOTS_PER_HOUR,
        (slot % SLOTS_PER_HOUR) * MINUTES_PER_SLOT,
        0,
    )
    .ok_or(ProtocolError::InvalidTimeSlot(value))?;
    Ok(Some(time))
}

/// Encode one schedule time slot.
///
/// # Errors
///
/// Returns [`ProtocolError::UnalignedTime`] unless the time falls on a
/// 10 minute boundary.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_time_slot(value: Option<NaiveTime>) -> Result<u8> {
    let Some(time) = value else {
        return Ok(NO_TIME);
    };
    if time.minute() % MINUTES_PER_SLOT != 0 || time.second() != 0 || time.nanosecond() != 0 {
        return Err(ProtocolError::UnalignedTime(time));
    }
    Ok((time.hour() * SLOTS_PER_HOUR + time.minute() / MINUTES_PER_SLOT) as u8)
}

/// Decode the heating periods of one weekday.
///
/// A slot pair where either side is unused decodes as an unused period.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] or [`ProtocolError::InvalidTimeSlot`].
pub fn decode_day_schedule(value: &[u8]) -> Result<DaySchedule> {
    let raw = fixed::<WEEKDAY_LEN>("weekday", value)?;
    let mut schedule = DaySchedule::empty();
    for (slot, pair) in schedule.periods.iter_mut().zip(raw.chunks_exact(2)) {
        let start = decode_time_slot(pair[0])?;
        let end = decode_time_slot(pair[1])?;
        *slot = start.zip(end).map(|(start, end)| HeatingPeriod::new(start, end));
    }
    Ok(schedule)
}

/// Encode the heating periods of one weekday.
///
/// # Errors
///
/// Returns [`ProtocolError::UnalignedTime`] for times off the 10 minute grid.
pub fn encode_day_schedule(schedule: &DaySchedule) -> Result<[u8; WEEKDAY_LEN]> {
    let mut raw = [NO_TIME; WEEKDAY_LEN];
    for (pair, period) in raw.chunks_exact_mut(2).zip(&schedule.periods) {
        if let Some(period) = period {
            pair[0] = encode_time_slot(Some(period.start))?;
            pair[1] = encode_time_slot(Some(period.end))?;
        }
    }
    Ok(raw)
}

// ============================================================================
// HOLIDAYS
// ============================================================================

/// Decode a holiday register. Registers that do not hold valid dates, such
/// as a cleared register, decode as `None`.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] unless the payload has 9 bytes.
#[allow(clippy::cast_possible_wrap)]
pub fn decode_holiday(value: &[u8]) -> Result<Option<Holiday>> {
    let raw = fixed::<HOLIDAY_LEN>("holiday", value)?;
    let start = decode_date_hour(raw[0], raw[1], raw[2], raw[3]);
    let end = decode_date_hour(raw[4], raw[5], raw[6], raw[7]);

    let (Some(start), Some(end)) = (start, end) else {
        tracing::debug!(payload = ?raw, "holiday register holds no valid period");
        return Ok(None);
    };

    Ok(Some(Holiday {
        start,
        end,
        temperature: Temperature::from_half_degrees(raw[8] as i8),
    }))
}

/// Encode a holiday register. Start and end are truncated to the hour.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidHolidayRange`] unless the holiday ends
/// after it starts, [`ProtocolError::HolidayTemperatureOutOfRange`] for
/// setpoints outside 8.0..29.0 °C and [`ProtocolError::YearOutOfRange`] for
/// years the device cannot store.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_holiday(holiday: &Holiday) -> Result<[u8; HOLIDAY_LEN]> {
    let Holiday {
        start,
        end,
        temperature,
    } = *holiday;
    let start = truncate_to_hour(start);
    let end = truncate_to_hour(end);

    if start >= end {
        return Err(ProtocolError::InvalidHolidayRange { start, end });
    }
    let celsius = temperature.celsius();
    if !(HOLIDAY_MIN_CELSIUS..HOLIDAY_MAX_CELSIUS).contains(&celsius) {
        return Err(ProtocolError::HolidayTemperatureOutOfRange(celsius));
    }

    Ok([
        start.hour() as u8,
        start.day() as u8,
        start.month() as u8,
        encode_year(start.year())?,
        end.hour() as u8,
        end.day() as u8,
        end.month() as u8,
        encode_year(end.year())?,
        temperature.half_degrees() as u8,
    ])
}

fn truncate_to_hour(value: NaiveDateTime) -> NaiveDateTime {
    value
        .date()
        .and_hms_opt(value.hour(), 0, 0)
        .unwrap_or(value)
}

// ============================================================================
// SETTINGS / STATUS
// ============================================================================

/// Decode the settings/status characteristic.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] unless the payload has 3 bytes.
pub fn decode_status(value: &[u8]) -> Result<DeviceStatus> {
    fixed::<SETTINGS_LEN>("settings", value).map(DeviceStatus::from_raw)
}

/// Payload that switches manual mode on or off and leaves the other bytes alone.
#[must_use]
pub const fn encode_manual_mode(enabled: bool) -> [u8; SETTINGS_LEN] {
    [enabled as u8, UNCHANGED_VALUE, UNCHANGED_VALUE]
}

// ============================================================================
// BATTERY
// ============================================================================

/// Decode the battery level in percent; `None` if the valve does not know it.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] unless the payload has 1 byte.
pub fn decode_battery(value: &[u8]) -> Result<Option<u8>> {
    let [level] = fixed::<BATTERY_LEN>("battery", value)?;
    Ok((level != BATTERY_UNKNOWN).then_some(level))
}
