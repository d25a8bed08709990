//! Unified error types for the Comet Blue client library.
//!
//! This module provides a unified error type [`CometBlueError`] that covers all failure
//! modes of the library. Each module also has its own specific error type
//! ([`ProtocolError`], [`BluetoothError`], [`ConfigError`]) which converts into it.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each module error captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **Context preservation**: Wrapped errors keep their original source
//!
//! # Example
//!
//! ```rust
//! use cometblue_core::error::Result;
//! use cometblue_core::types::HolidaySlot;
//!
//! fn holiday_slot(index: u8) -> Result<HolidaySlot> {
//!     Ok(HolidaySlot::new(index)?)
//! }
//!
//! assert!(holiday_slot(3).is_ok());
//! assert!(holiday_slot(8).unwrap_err().is_protocol_error());
//! ```

use thiserror::Error;

pub use crate::bluetooth::BluetoothError;
pub use crate::config::ConfigError;
pub use crate::protocol::ProtocolError;

/// The unified error type for all Comet Blue operations.
#[derive(Debug, Error)]
pub enum CometBlueError {
    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// The Bluetooth stack or the device failed.
    #[error(transparent)]
    Bluetooth(#[from] BluetoothError),

    // =========================================================================
    // PROTOCOL ERRORS
    // =========================================================================
    /// A payload could not be encoded or a device response could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The client configuration could not be loaded, saved or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Comet Blue operations.
pub type Result<T> = std::result::Result<T, CometBlueError>;

/// Short alias for [`CometBlueError`].
pub type Error = CometBlueError;

impl CometBlueError {
    /// Returns `true` if this error is related to Bluetooth operations.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(self, Self::Bluetooth(_))
    }

    /// Returns `true` if this error came from encoding or decoding a payload.
    #[inline]
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` if this error is related to I/O.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Returns `true` if retrying the same operation may succeed.
    ///
    /// Radio conditions change; a device that timed out or was not seen a
    /// moment ago can answer on the next try. Bad input never will.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Bluetooth(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Bluetooth(err) => err.error_code(),
            Self::Protocol(err) => err.error_code(),
            Self::Config(err) => err.error_code(),
            Self::Io(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};
    use std::time::Duration;

    #[test]
    fn test_bluetooth_error_classification() {
        let err: CometBlueError = BluetoothError::AdapterNotFound.into();
        assert!(err.is_bluetooth_error());
        assert!(!err.is_protocol_error());
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_protocol_error_classification() {
        let err: CometBlueError = ProtocolError::InvalidPin(100_000_000).into();
        assert!(err.is_protocol_error());
        assert!(!err.is_bluetooth_error());
    }

    #[test]
    fn test_config_error_classification() {
        let err: CometBlueError = ConfigError::ValidationError {
            field: "connect_attempts".into(),
            message: "must be at least 1".into(),
        }
        .into();
        assert!(err.is_config_error());
        assert!(!err.is_io_error());
    }

    #[test]
    fn test_io_error_classification() {
        let err: CometBlueError = IoErr::new(ErrorKind::NotFound, "test").into();
        assert!(err.is_io_error());
        assert!(!err.is_bluetooth_error());
    }

    #[test]
    fn test_recoverable_errors() {
        let timeout: CometBlueError = BluetoothError::ConnectTimeout {
            address: "AA:BB:CC:DD:EE:FF".into(),
            attempts: 3,
            timeout: Duration::from_secs(4),
        }
        .into();
        assert!(timeout.is_recoverable());

        let not_found: CometBlueError = BluetoothError::DeviceNotFound {
            address: "AA:BB:CC:DD:EE:FF".into(),
        }
        .into();
        assert!(not_found.is_recoverable());

        let adapter: CometBlueError = BluetoothError::AdapterNotFound.into();
        assert!(!adapter.is_recoverable());

        let bad_input: CometBlueError = ProtocolError::InvalidHolidaySlot(9).into();
        assert!(!bad_input.is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        let err: CometBlueError = BluetoothError::NotConnected.into();
        assert_eq!(err.error_code(), "NOT_CONNECTED");

        let err: CometBlueError = ProtocolError::InvalidLength {
            characteristic: "temperature",
            expected: 7,
            actual: 3,
        }
        .into();
        assert_eq!(err.error_code(), "INVALID_PAYLOAD_LENGTH");

        let err: CometBlueError = IoErr::new(ErrorKind::Other, "x").into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_error_display_is_transparent() {
        let err: CometBlueError = BluetoothError::AdapterNotFound.into();
        assert!(format!("{err}").contains("No Bluetooth adapter found"));

        let err: CometBlueError = ProtocolError::InvalidHolidaySlot(12).into();
        assert!(format!("{err}").contains("12"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<CometBlueError>();
        assert_sync::<CometBlueError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn example_function() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(example_function().unwrap(), 42);

        fn failing_function() -> Result<i32> {
            Err(BluetoothError::NotConnected.into())
        }
        assert!(failing_function().is_err());
    }
}
