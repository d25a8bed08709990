//! Typed values read from and written to the valve.
//!
//! These types carry no knowledge of byte layouts; see [`crate::protocol`]
//! for the encodings.

use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

// ============================================================================
// PIN
// ============================================================================

/// Numeric PIN that unlocks a connection. Up to 8 decimal digits.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Pin(u32);

impl Pin {
    /// Largest PIN the valve accepts.
    pub const MAX: u32 = 99_999_999;

    /// Create a PIN.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPin`] if `value` has more than 8 digits.
    pub fn new(value: u32) -> Result<Self, ProtocolError> {
        if value > Self::MAX {
            return Err(ProtocolError::InvalidPin(value));
        }
        Ok(Self(value))
    }

    /// The numeric value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(********)")
    }
}

// ============================================================================
// TEMPERATURES
// ============================================================================

/// A temperature in the valve's native resolution of 0.5 °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "f32", try_from = "f32")]
pub struct Temperature(i8);

impl Temperature {
    /// Build from the raw half-degree count as stored on the device.
    ///
    /// Accepts every byte, including `i8::MIN`, which the device uses as the
    /// "unchanged" marker in writes. [`TemperatureUpdate`] setters treat that
    /// value as "leave as is".
    #[must_use]
    pub const fn from_half_degrees(half_degrees: i8) -> Self {
        Self(half_degrees)
    }

    /// Build from degrees Celsius.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidTemperature`] if `celsius` is not a
    /// multiple of 0.5 or lies outside −63.5..=63.5 °C.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_celsius(celsius: f32) -> Result<Self, ProtocolError> {
        let doubled = celsius * 2.0;
        if !doubled.is_finite()
            || (doubled - doubled.round()).abs() > f32::EPSILON
            || !(-127.0..=127.0).contains(&doubled)
        {
            return Err(ProtocolError::InvalidTemperature(celsius));
        }
        Ok(Self(doubled.round() as i8))
    }

    /// Raw half-degree count.
    #[must_use]
    pub const fn half_degrees(self) -> i8 {
        self.0
    }

    /// Degrees Celsius.
    #[must_use]
    pub fn celsius(self) -> f32 {
        f32::from(self.0) / 2.0
    }
}

impl From<Temperature> for f32 {
    fn from(t: Temperature) -> Self {
        t.celsius()
    }
}

impl TryFrom<f32> for Temperature {
    type Error = ProtocolError;

    /// Like [`Temperature::from_celsius`], but also accepts −64.0 °C, the
    /// value a `0x80` byte decodes to, so every reading deserializes.
    fn try_from(celsius: f32) -> Result<Self, Self::Error> {
        if (celsius * 2.0 - f32::from(i8::MIN)).abs() < f32::EPSILON {
            return Ok(Self(i8::MIN));
        }
        Self::from_celsius(celsius)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} °C", self.celsius())
    }
}

/// Contents of the temperature characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureReading {
    /// Temperature measured at the valve.
    pub current: Temperature,

    /// Setpoint used in manual mode.
    pub manual: Temperature,

    /// Lower setpoint of the automatic schedule (outside heating periods).
    pub target_low: Temperature,

    /// Upper setpoint of the automatic schedule (inside heating periods).
    pub target_high: Temperature,

    /// Correction applied to the measured temperature.
    pub offset: Temperature,

    /// Whether the valve currently detects an open window.
    pub window_open: bool,

    /// How long heating stays off after an open window is detected.
    pub window_open_minutes: u8,
}

/// A partial update of the temperature characteristic.
///
/// Fields left as `None` keep their current value on the device. The
/// setters store `None` for a temperature of `i8::MIN` half-degrees, since
/// the device reads that byte as "unchanged" anyway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureUpdate {
    /// Setpoint used in manual mode.
    pub manual: Option<Temperature>,

    /// Lower setpoint of the automatic schedule.
    pub target_low: Option<Temperature>,

    /// Upper setpoint of the automatic schedule.
    pub target_high: Option<Temperature>,

    /// Correction applied to the measured temperature.
    pub offset: Option<Temperature>,
}

const fn settable(t: Temperature) -> Option<Temperature> {
    if t.0 == i8::MIN {
        None
    } else {
        Some(t)
    }
}

impl TemperatureUpdate {
    /// An update that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the manual-mode setpoint.
    #[must_use]
    pub const fn manual(mut self, t: Temperature) -> Self {
        self.manual = settable(t);
        self
    }

    /// Set the lower automatic setpoint.
    #[must_use]
    pub const fn target_low(mut self, t: Temperature) -> Self {
        self.target_low = settable(t);
        self
    }

    /// Set the upper automatic setpoint.
    #[must_use]
    pub const fn target_high(mut self, t: Temperature) -> Self {
        self.target_high = settable(t);
        self
    }

    /// Set the measurement offset.
    #[must_use]
    pub const fn offset(mut self, t: Temperature) -> Self {
        self.offset = settable(t);
        self
    }

    /// `true` if no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.manual.is_none()
            && self.target_low.is_none()
            && self.target_high.is_none()
            && self.offset.is_none()
    }
}

// ============================================================================
// WEEKLY SCHEDULE
// ============================================================================

/// One heating period of a day. Times have 10 minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatingPeriod {
    /// When the upper setpoint starts to apply.
    pub start: NaiveTime,
    /// When the lower setpoint applies again.
    pub end: NaiveTime,
}

impl HeatingPeriod {
    /// Create a heating period.
    #[must_use]
    pub const fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }
}

/// Number of heating period slots per weekday.
pub const PERIODS_PER_DAY: usize = 4;

/// Up to four heating periods of a single weekday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    /// Period slots in device order; `None` marks an unused slot.
    pub periods: [Option<HeatingPeriod>; PERIODS_PER_DAY],
}

impl DaySchedule {
    /// A day without heating periods.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fill the first slots with `periods`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TooManyPeriods`] for more than four periods.
    pub fn from_periods<I>(periods: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = HeatingPeriod>,
    {
        let mut schedule = Self::default();
        for (i, period) in periods.into_iter().enumerate() {
            let slot = schedule
                .periods
                .get_mut(i)
                .ok_or(ProtocolError::TooManyPeriods(i + 1))?;
            *slot = Some(period);
        }
        Ok(schedule)
    }

    /// The configured periods, skipping unused slots.
    pub fn active(&self) -> impl Iterator<Item = &HeatingPeriod> {
        self.periods.iter().flatten()
    }
}

// ============================================================================
// HOLIDAYS
// ============================================================================

/// Index of one of the eight holiday registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HolidaySlot(u8);

impl HolidaySlot {
    /// Number of holiday registers on the device.
    pub const COUNT: u8 = 8;

    /// Create a slot index.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHolidaySlot`] unless `index < 8`.
    pub fn new(index: u8) -> Result<Self, ProtocolError> {
        if index >= Self::COUNT {
            return Err(ProtocolError::InvalidHolidaySlot(index));
        }
        Ok(Self(index))
    }

    /// Zero-based slot index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// All slots in order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..Self::COUNT).map(Self)
    }
}

impl TryFrom<u8> for HolidaySlot {
    type Error = ProtocolError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl From<HolidaySlot> for u8 {
    fn from(slot: HolidaySlot) -> Self {
        slot.0
    }
}

/// A holiday period with its own setpoint. Start and end have hourly resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    /// First hour of the holiday.
    pub start: NaiveDateTime,
    /// Hour the holiday ends.
    pub end: NaiveDateTime,
    /// Setpoint held during the holiday.
    pub temperature: Temperature,
}

// ============================================================================
// STATUS
// ============================================================================

/// Raw contents of the settings/status characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    raw: [u8; 3],
}

impl DeviceStatus {
    const MANUAL_MODE: u8 = 0x01;

    /// Wrap the three status bytes.
    #[must_use]
    pub const fn from_raw(raw: [u8; 3]) -> Self {
        Self { raw }
    }

    /// The three status bytes as read.
    #[must_use]
    pub const fn raw(&self) -> [u8; 3] {
        self.raw
    }

    /// `true` if the valve follows the manual setpoint instead of the schedule.
    #[must_use]
    pub const fn manual_mode(&self) -> bool {
        self.raw[0] & Self::MANUAL_MODE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_bounds() {
        assert!(Pin::new(0).is_ok());
        assert_eq!(Pin::new(99_999_999).unwrap().value(), 99_999_999);
        assert!(matches!(
            Pin::new(100_000_000),
            Err(ProtocolError::InvalidPin(100_000_000))
        ));
    }

    #[test]
    fn test_pin_debug_is_redacted() {
        let pin = Pin::new(1234).unwrap();
        assert!(!format!("{pin:?}").contains("1234"));
    }

    #[test]
    fn test_temperature_from_celsius() {
        assert_eq!(Temperature::from_celsius(21.5).unwrap().half_degrees(), 43);
        assert_eq!(Temperature::from_celsius(-2.0).unwrap().half_degrees(), -4);
        assert!((Temperature::from_half_degrees(35).celsius() - 17.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_temperature_rejects_off_grid_and_out_of_range() {
        assert!(Temperature::from_celsius(20.3).is_err());
        assert!(Temperature::from_celsius(64.0).is_err());
        assert!(Temperature::from_celsius(-64.0).is_err());
        assert!(Temperature::from_celsius(f32::NAN).is_err());
        assert!(Temperature::from_celsius(63.5).is_ok());
    }

    #[test]
    fn test_temperature_serializes_as_celsius() {
        let t = Temperature::from_celsius(19.5).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "19.5");
        let back: Temperature = serde_json::from_str("19.5").unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<Temperature>("19.4").is_err());
    }

    #[test]
    fn test_temperature_update_builder() {
        assert!(TemperatureUpdate::new().is_empty());
        let update = TemperatureUpdate::new().manual(Temperature::from_half_degrees(42));
        assert!(!update.is_empty());
        assert_eq!(update.manual, Some(Temperature::from_half_degrees(42)));
        assert_eq!(update.target_low, None);
    }

    #[test]
    fn test_unchanged_marker_reading_survives_serde() {
        let reading =
            crate::protocol::decode_temperatures(&[0x80, 42, 32, 42, 0, 0, 0]).unwrap();
        assert_eq!(reading.current, Temperature::from_half_degrees(i8::MIN));

        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("-64.0"));
        let back: TemperatureReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn test_update_setters_skip_unchanged_marker() {
        let marker = Temperature::from_half_degrees(i8::MIN);
        let update = TemperatureUpdate::new()
            .manual(marker)
            .target_low(marker)
            .target_high(marker)
            .offset(marker);
        assert!(update.is_empty());

        let update = update.target_high(Temperature::from_half_degrees(44));
        assert_eq!(update.manual, None);
        assert_eq!(update.target_high, Some(Temperature::from_half_degrees(44)));
    }

    #[test]
    fn test_day_schedule_from_periods() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        let schedule =
            DaySchedule::from_periods([HeatingPeriod::new(t(6, 0), t(8, 30))]).unwrap();
        assert_eq!(schedule.active().count(), 1);
        assert_eq!(schedule.periods[1], None);

        let five = std::iter::repeat(HeatingPeriod::new(t(1, 0), t(2, 0))).take(5);
        assert!(matches!(
            DaySchedule::from_periods(five),
            Err(ProtocolError::TooManyPeriods(5))
        ));
    }

    #[test]
    fn test_holiday_slot_bounds() {
        assert_eq!(HolidaySlot::all().count(), 8);
        assert!(HolidaySlot::new(7).is_ok());
        assert!(HolidaySlot::new(8).is_err());
        assert!(serde_json::from_str::<HolidaySlot>("9").is_err());
    }

    #[test]
    fn test_device_status_manual_flag() {
        assert!(DeviceStatus::from_raw([0x01, 0x00, 0x00]).manual_mode());
        assert!(DeviceStatus::from_raw([0x81, 0x02, 0x00]).manual_mode());
        assert!(!DeviceStatus::from_raw([0x80, 0x00, 0x00]).manual_mode());
    }
}
