//! High-level client for one Comet Blue valve.
//!
//! [`CometBlue`] maps each operation onto a single GATT read or write and
//! runs the payload through [`crate::protocol`]. It keeps no device state
//! beyond whether the link is up.
//!
//! # Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "bluetooth")]
//! # async fn example() -> cometblue_core::Result<()> {
//! use cometblue_core::{ClientConfig, CometBlue, Pin, Temperature, TemperatureUpdate};
//!
//! let config = ClientConfig::default();
//! let mut valve = CometBlue::open("E0:E5:CF:12:34:56", Pin::new(0)?, &config).await?;
//! valve.connect().await?;
//!
//! let reading = valve.get_temperature().await?;
//! println!("measured {}", reading.current);
//!
//! let update = TemperatureUpdate::new().manual(Temperature::from_celsius(21.5)?);
//! valve.set_temperature(&update).await?;
//!
//! valve.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use chrono::{Local, NaiveDateTime, Weekday};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bluetooth::{BluetoothError, GattTransport};
use crate::error::Result;
use crate::protocol;
use crate::types::{
    DaySchedule, DeviceStatus, Holiday, HolidaySlot, Pin, TemperatureReading, TemperatureUpdate,
};
use crate::uuids;

#[cfg(feature = "bluetooth")]
use crate::bluetooth::{BluerTransport, DiscoveredDevice};
#[cfg(feature = "bluetooth")]
use crate::config::{ClientConfig, ConfigError};

/// How hard [`CometBlue::connect`] tries.
///
/// Each attempt is bounded by its own timeout. After a failed attempt the
/// timeout grows by two seconds, up to twice the initial timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Timeout of the first attempt.
    pub timeout: Duration,
    /// Number of attempts; `0` is treated as `1`.
    pub attempts: u32,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            attempts: 1,
        }
    }
}

impl ConnectionOptions {
    const TIMEOUT_STEP: Duration = Duration::from_secs(2);

    /// Timeout of the zero-based `attempt`.
    #[must_use]
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        let grown = self
            .timeout
            .saturating_add(Self::TIMEOUT_STEP.saturating_mul(attempt));
        grown.min(self.timeout.saturating_mul(2))
    }
}

/// Client for one Comet Blue valve.
pub struct CometBlue<T: GattTransport> {
    transport: T,
    pin: Pin,
    options: ConnectionOptions,
    connected: bool,
}

impl<T: GattTransport> CometBlue<T> {
    /// Wrap a transport. Does not connect.
    pub fn new(transport: T, pin: Pin) -> Self {
        Self {
            transport,
            pin,
            options: ConnectionOptions::default(),
            connected: false,
        }
    }

    /// Replace the connection policy.
    #[must_use]
    pub const fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether [`CometBlue::connect`] succeeded and no disconnect followed.
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Connect and unlock the valve with the PIN.
    ///
    /// Does nothing if already connected.
    ///
    /// # Errors
    ///
    /// Returns the error of the last failed attempt, a
    /// [`BluetoothError::ConnectTimeout`] if it timed out, or the PIN write
    /// error (the link is dropped in that case).
    #[instrument(skip(self), fields(address = self.transport.address()))]
    pub async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }

        let attempts = self.options.attempts.max(1);
        let mut last_error = BluetoothError::NotConnected;
        for attempt in 0..attempts {
            let timeout = self.options.attempt_timeout(attempt);
            match tokio::time::timeout(timeout, self.transport.connect()).await {
                Ok(Ok(())) => return self.unlock().await,
                Ok(Err(err)) => {
                    warn!(attempt = attempt + 1, error = %err, "connection attempt failed");
                    self.drop_link().await;
                    last_error = err;
                }
                Err(_) => {
                    warn!(attempt = attempt + 1, ?timeout, "connection attempt timed out");
                    self.drop_link().await;
                    last_error = BluetoothError::ConnectTimeout {
                        address: self.transport.address().to_string(),
                        attempts: attempt + 1,
                        timeout,
                    };
                }
            }
        }
        Err(last_error.into())
    }

    /// Best-effort teardown after a failed attempt.
    async fn drop_link(&mut self) {
        if let Err(err) = self.transport.disconnect().await {
            debug!(error = %err, "cleanup after failed attempt failed");
        }
    }

    async fn unlock(&mut self) -> Result<()> {
        if let Err(err) = self
            .transport
            .write(uuids::PIN, &protocol::encode_pin(self.pin))
            .await
        {
            warn!(error = %err, "PIN write failed, disconnecting");
            self.drop_link().await;
            return Err(err.into());
        }
        self.connected = true;
        info!(address = self.transport.address(), "connected");
        Ok(())
    }

    /// Drop the link. Does nothing if not connected.
    ///
    /// # Errors
    ///
    /// Passes through transport errors; the client counts as disconnected
    /// either way.
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.transport.disconnect().await?;
        info!(address = self.transport.address(), "disconnected");
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        if !self.connected {
            return Err(BluetoothError::NotConnected.into());
        }
        let value = self.transport.read(characteristic).await?;
        debug!(
            characteristic = uuids::name_of(characteristic),
            payload = ?value,
            "read"
        );
        Ok(value)
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(BluetoothError::NotConnected.into());
        }
        debug!(
            characteristic = uuids::name_of(characteristic),
            payload = ?value,
            "write"
        );
        self.transport.write(characteristic, value).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Temperatures
    // ------------------------------------------------------------------------

    /// Read the measured temperature, the setpoints and the window state.
    ///
    /// # Errors
    ///
    /// Fails if not connected, on transport errors and on malformed payloads.
    pub async fn get_temperature(&self) -> Result<TemperatureReading> {
        let value = self.read(uuids::TEMPERATURE).await?;
        Ok(protocol::decode_temperatures(&value)?)
    }

    /// Change some of the setpoints. Fields left `None` are not touched.
    ///
    /// # Errors
    ///
    /// Fails if not connected and on transport errors.
    pub async fn set_temperature(&self, update: &TemperatureUpdate) -> Result<()> {
        if update.is_empty() {
            debug!("empty temperature update, nothing to write");
            return Ok(());
        }
        self.write(
            uuids::TEMPERATURE,
            &protocol::encode_temperature_update(update),
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Battery
    // ------------------------------------------------------------------------

    /// Battery level in percent, `None` if the valve reports it as unknown.
    ///
    /// # Errors
    ///
    /// Fails if not connected, on transport errors and on malformed payloads.
    pub async fn get_battery(&self) -> Result<Option<u8>> {
        let value = self.read(uuids::BATTERY).await?;
        Ok(protocol::decode_battery(&value)?)
    }

    // ------------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------------

    /// The valve's clock, which drives the weekly schedule.
    ///
    /// # Errors
    ///
    /// Fails if not connected, on transport errors and on malformed payloads.
    pub async fn get_datetime(&self) -> Result<NaiveDateTime> {
        let value = self.read(uuids::DATETIME).await?;
        Ok(protocol::decode_datetime(&value)?)
    }

    /// Set the valve's clock. Seconds are dropped.
    ///
    /// # Errors
    ///
    /// Fails for years outside 2000..=2099, if not connected and on
    /// transport errors.
    pub async fn set_datetime(&self, value: &NaiveDateTime) -> Result<()> {
        let payload = protocol::encode_datetime(value)?;
        self.write(uuids::DATETIME, &payload).await
    }

    /// Set the valve's clock to the local time of this machine.
    ///
    /// # Errors
    ///
    /// See [`CometBlue::set_datetime`].
    pub async fn sync_datetime(&self) -> Result<()> {
        self.set_datetime(&Local::now().naive_local()).await
    }

    // ------------------------------------------------------------------------
    // Weekly schedule
    // ------------------------------------------------------------------------

    /// Heating periods of `day`.
    ///
    /// # Errors
    ///
    /// Fails if not connected, on transport errors and on malformed payloads.
    pub async fn get_weekday(&self, day: Weekday) -> Result<DaySchedule> {
        let value = self.read(uuids::weekday(day)).await?;
        Ok(protocol::decode_day_schedule(&value)?)
    }

    /// Replace the heating periods of `day`.
    ///
    /// # Errors
    ///
    /// Fails for times off the 10 minute grid, if not connected and on
    /// transport errors.
    pub async fn set_weekday(&self, day: Weekday, schedule: &DaySchedule) -> Result<()> {
        let payload = protocol::encode_day_schedule(schedule)?;
        self.write(uuids::weekday(day), &payload).await
    }

    // ------------------------------------------------------------------------
    // Holidays
    // ------------------------------------------------------------------------

    /// Holiday stored in `slot`, `None` if the slot is unused.
    ///
    /// # Errors
    ///
    /// Fails if not connected, on transport errors and on malformed payloads.
    pub async fn get_holiday(&self, slot: HolidaySlot) -> Result<Option<Holiday>> {
        let value = self.read(uuids::holiday(slot)).await?;
        Ok(protocol::decode_holiday(&value)?)
    }

    /// Store `holiday` in `slot`.
    ///
    /// # Errors
    ///
    /// Fails for holidays that do not end after they start, setpoints outside
    /// 8.0..29.0 °C, if not connected and on transport errors.
    pub async fn set_holiday(&self, slot: HolidaySlot, holiday: &Holiday) -> Result<()> {
        let payload = protocol::encode_holiday(holiday)?;
        self.write(uuids::holiday(slot), &payload).await
    }

    /// Clear `slot`.
    ///
    /// # Errors
    ///
    /// Fails if not connected and on transport errors.
    pub async fn reset_holiday(&self, slot: HolidaySlot) -> Result<()> {
        self.write(uuids::holiday(slot), &protocol::NO_HOLIDAY).await
    }

    // ------------------------------------------------------------------------
    // Mode
    // ------------------------------------------------------------------------

    /// Raw status flags.
    ///
    /// # Errors
    ///
    /// Fails if not connected, on transport errors and on malformed payloads.
    pub async fn get_status(&self) -> Result<DeviceStatus> {
        let value = self.read(uuids::SETTINGS).await?;
        Ok(protocol::decode_status(&value)?)
    }

    /// `true` if the valve holds the manual setpoint instead of following
    /// the schedule.
    ///
    /// # Errors
    ///
    /// See [`CometBlue::get_status`].
    pub async fn get_manual_mode(&self) -> Result<bool> {
        Ok(self.get_status().await?.manual_mode())
    }

    /// Switch between manual and scheduled operation.
    ///
    /// # Errors
    ///
    /// Fails if not connected and on transport errors.
    pub async fn set_manual_mode(&self, enabled: bool) -> Result<()> {
        self.write(uuids::SETTINGS, &protocol::encode_manual_mode(enabled))
            .await
    }
}

#[cfg(feature = "bluetooth")]
impl CometBlue<BluerTransport> {
    /// Bind to the valve at `address` over BlueZ, using the adapter and
    /// connection policy from `config`. Does not connect.
    ///
    /// # Errors
    ///
    /// Fails if no adapter is usable or the address is invalid.
    pub async fn open(address: &str, pin: Pin, config: &ClientConfig) -> Result<Self> {
        let transport = BluerTransport::open(config.adapter.as_deref(), address).await?;
        Ok(Self::new(transport, pin).with_options(config.connection_options()))
    }

    /// Bind to a valve listed in `config`, by name or address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDevice`] if no entry matches, otherwise
    /// see [`CometBlue::open`].
    pub async fn open_configured(name_or_address: &str, config: &ClientConfig) -> Result<Self> {
        let entry = config
            .device(name_or_address)
            .ok_or_else(|| ConfigError::UnknownDevice(name_or_address.to_string()))?;
        Self::open(&entry.address, entry.pin()?, config).await
    }

    /// Scan for valves for the configured discovery time.
    ///
    /// # Errors
    ///
    /// Fails if no adapter is usable or BlueZ refuses to scan.
    pub async fn discover(config: &ClientConfig) -> Result<Vec<DiscoveredDevice>> {
        let adapter = crate::bluetooth::open_adapter(config.adapter.as_deref()).await?;
        Ok(crate::bluetooth::discover(&adapter, config.discovery_timeout()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::MockTransport;
    use crate::error::CometBlueError;
    use crate::types::{HeatingPeriod, Temperature};
    use chrono::{NaiveDate, NaiveTime};

    const ADDRESS: &str = "E0:E5:CF:12:34:56";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("cometblue_core=debug")
            .with_test_writer()
            .try_init();
    }

    fn valve() -> MockTransport {
        MockTransport::new(ADDRESS)
            .with_register(uuids::TEMPERATURE, vec![41, 42, 32, 42, 0, 0x00, 10])
            .with_register(uuids::BATTERY, vec![76])
            .with_register(uuids::SETTINGS, vec![0x00, 0x12, 0x34])
            .with_register(uuids::DATETIME, vec![5, 12, 1, 6, 24])
            .with_register(uuids::weekday(Weekday::Mon), vec![0xFF; 8])
            .with_register(uuids::HOLIDAYS[0], protocol::NO_HOLIDAY.to_vec())
    }

    async fn connected(mock: &MockTransport) -> CometBlue<MockTransport> {
        init_tracing();
        let mut client = CometBlue::new(mock.clone(), Pin::new(1234).unwrap());
        client.connect().await.unwrap();
        client
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_attempt_timeout_growth() {
        let options = ConnectionOptions {
            timeout: Duration::from_secs(3),
            attempts: 10,
        };
        assert_eq!(options.attempt_timeout(0), Duration::from_secs(3));
        assert_eq!(options.attempt_timeout(1), Duration::from_secs(5));
        assert_eq!(options.attempt_timeout(2), Duration::from_secs(6));
        assert_eq!(options.attempt_timeout(9), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_connect_writes_pin_first() {
        let mock = valve();
        let client = connected(&mock).await;

        assert!(client.is_connected());
        assert_eq!(mock.writes(), vec![(uuids::PIN, vec![0xD2, 0x04, 0, 0])]);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let mock = valve();
        let mut client = connected(&mock).await;
        client.connect().await.unwrap();
        assert_eq!(mock.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let client = CometBlue::new(valve(), Pin::default());
        let err = client.get_battery().await.unwrap_err();
        assert!(matches!(
            err,
            CometBlueError::Bluetooth(BluetoothError::NotConnected)
        ));
        assert!(client.set_manual_mode(true).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_retries_until_success() {
        let mock = valve();
        mock.fail_next_connects(2);
        let mut client = CometBlue::new(mock.clone(), Pin::default()).with_options(
            ConnectionOptions {
                timeout: Duration::from_secs(1),
                attempts: 3,
            },
        );

        client.connect().await.unwrap();
        assert_eq!(mock.connect_calls(), 3);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_single_attempt_passes_error_through() {
        let mock = valve();
        mock.fail_next_connects(1);
        let mut client = CometBlue::new(mock.clone(), Pin::default());

        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            CometBlueError::Bluetooth(BluetoothError::ConnectFailed { .. })
        ));
        assert!(err.is_recoverable());
        assert_eq!(mock.connect_calls(), 1);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_failed_attempt_drops_half_open_link() {
        let mock = valve();
        mock.fail_next_service_lookups(1);
        let mut client = CometBlue::new(mock.clone(), Pin::default());

        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            CometBlueError::Bluetooth(BluetoothError::ServiceNotFound { .. })
        ));
        assert!(!client.is_connected());
        assert!(!mock.is_connected());
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_missing_service() {
        let mock = valve();
        mock.fail_next_service_lookups(1);
        let mut client = CometBlue::new(mock.clone(), Pin::default()).with_options(
            ConnectionOptions {
                timeout: Duration::from_secs(1),
                attempts: 2,
            },
        );

        client.connect().await.unwrap();
        assert_eq!(mock.connect_calls(), 2);
        assert!(mock.is_connected());
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let mock = valve();
        mock.set_connect_delay(Duration::from_millis(500));
        let mut client = CometBlue::new(mock.clone(), Pin::default()).with_options(
            ConnectionOptions {
                timeout: Duration::from_millis(20),
                attempts: 2,
            },
        );

        match client.connect().await {
            Err(CometBlueError::Bluetooth(BluetoothError::ConnectTimeout {
                attempts, timeout, ..
            })) => {
                assert_eq!(attempts, 2);
                assert_eq!(timeout, Duration::from_millis(40));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn test_rejected_pin_drops_link() {
        let mock = valve();
        mock.fail_writes_to(uuids::PIN);
        let mut client = CometBlue::new(mock.clone(), Pin::default());

        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            CometBlueError::Bluetooth(BluetoothError::Gatt { .. })
        ));
        assert!(!client.is_connected());
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let mock = valve();
        let mut client = connected(&mock).await;
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
        assert!(!mock.is_connected());
        client.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_temperature_roundtrip() {
        let mock = valve();
        let client = connected(&mock).await;

        let before = client.get_temperature().await.unwrap();
        assert!((before.current.celsius() - 20.5).abs() < f32::EPSILON);
        assert!(!before.window_open);

        let update = TemperatureUpdate::new()
            .manual(Temperature::from_celsius(23.0).unwrap())
            .target_low(Temperature::from_celsius(17.0).unwrap());
        client.set_temperature(&update).await.unwrap();

        let after = client.get_temperature().await.unwrap();
        assert_eq!(after.manual, Temperature::from_celsius(23.0).unwrap());
        assert_eq!(after.target_low, Temperature::from_celsius(17.0).unwrap());
        assert_eq!(after.target_high, before.target_high);
        assert_eq!(after.current, before.current);
    }

    #[tokio::test]
    async fn test_empty_temperature_update_is_not_written() {
        let mock = valve();
        let client = connected(&mock).await;
        client
            .set_temperature(&TemperatureUpdate::new())
            .await
            .unwrap();
        assert_eq!(mock.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_battery() {
        let mock = valve();
        let client = connected(&mock).await;
        assert_eq!(client.get_battery().await.unwrap(), Some(76));

        mock.set_register(uuids::BATTERY, vec![0xFF]);
        assert_eq!(client.get_battery().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_datetime() {
        let mock = valve();
        let client = connected(&mock).await;
        let expected = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 5, 0)
            .unwrap();
        assert_eq!(client.get_datetime().await.unwrap(), expected);

        let new = NaiveDate::from_ymd_opt(2025, 1, 31)
            .unwrap()
            .and_hms_opt(7, 45, 0)
            .unwrap();
        client.set_datetime(&new).await.unwrap();
        assert_eq!(client.get_datetime().await.unwrap(), new);

        client.sync_datetime().await.unwrap();
        assert_eq!(mock.register(uuids::DATETIME).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_weekday_schedule() {
        let mock = valve();
        let client = connected(&mock).await;
        assert_eq!(
            client.get_weekday(Weekday::Mon).await.unwrap(),
            DaySchedule::empty()
        );

        let schedule = DaySchedule::from_periods([
            HeatingPeriod::new(time(6, 0), time(8, 0)),
            HeatingPeriod::new(time(18, 0), time(22, 30)),
        ])
        .unwrap();
        client.set_weekday(Weekday::Fri, &schedule).await.unwrap();
        assert_eq!(client.get_weekday(Weekday::Fri).await.unwrap(), schedule);

        let unaligned = DaySchedule::from_periods([HeatingPeriod::new(time(6, 5), time(8, 0))])
            .unwrap();
        let err = client
            .set_weekday(Weekday::Sat, &unaligned)
            .await
            .unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_holidays() {
        let mock = valve();
        let client = connected(&mock).await;
        let slot = HolidaySlot::new(0).unwrap();
        assert_eq!(client.get_holiday(slot).await.unwrap(), None);

        let day = |d, h| {
            NaiveDate::from_ymd_opt(2025, 8, d)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap()
        };
        let holiday = Holiday {
            start: day(1, 8),
            end: day(15, 20),
            temperature: Temperature::from_celsius(14.0).unwrap(),
        };
        client.set_holiday(slot, &holiday).await.unwrap();
        assert_eq!(client.get_holiday(slot).await.unwrap(), Some(holiday));

        client.reset_holiday(slot).await.unwrap();
        assert_eq!(client.get_holiday(slot).await.unwrap(), None);
        assert_eq!(
            mock.register(uuids::HOLIDAYS[0]).unwrap(),
            protocol::NO_HOLIDAY.to_vec()
        );
    }

    #[tokio::test]
    async fn test_manual_mode() {
        let mock = valve();
        let client = connected(&mock).await;
        assert!(!client.get_manual_mode().await.unwrap());

        client.set_manual_mode(true).await.unwrap();
        assert!(client.get_manual_mode().await.unwrap());
        assert_eq!(
            client.get_status().await.unwrap().raw(),
            [0x01, 0x12, 0x34]
        );

        client.set_manual_mode(false).await.unwrap();
        assert!(!client.get_manual_mode().await.unwrap());
    }
}
