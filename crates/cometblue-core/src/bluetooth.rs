//! Bluetooth Low Energy transport to Comet Blue valves.
//!
//! This module provides:
//! - The [`GattTransport`] trait that the client talks to
//! - A BlueZ backend built on `bluer` (feature `bluetooth`)
//! - An in-memory [`MockTransport`] (feature `mock-bluetooth`, and in tests)
//! - Discovery of valves advertising the Comet Blue service

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::uuids;

#[cfg(feature = "bluetooth")]
mod bluer_backend;
#[cfg(any(test, feature = "mock-bluetooth"))]
mod mock;

#[cfg(feature = "bluetooth")]
pub use bluer_backend::{discover, open_adapter, BluerTransport};
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use mock::MockTransport;

/// Errors raised by the Bluetooth layer.
#[derive(Debug, Error)]
pub enum BluetoothError {
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    AdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    AdapterPoweredOff,

    /// Could not open a session with the Bluetooth daemon.
    #[error("Failed to open Bluetooth session: {message}")]
    SessionInitFailed {
        /// Backend error message.
        message: String,
    },

    /// Address is not of the form `XX:XX:XX:XX:XX:XX`.
    #[error("Invalid Bluetooth address: '{address}'. Expected format XX:XX:XX:XX:XX:XX.")]
    InvalidAddress {
        /// The rejected address.
        address: String,
    },

    /// The adapter does not know the device.
    #[error("Device not found: '{address}'. Ensure the valve is within range.")]
    DeviceNotFound {
        /// Device address.
        address: String,
    },

    /// The link could not be established.
    #[error("Failed to connect to {address}: {message}")]
    ConnectFailed {
        /// Device address.
        address: String,
        /// Backend error message.
        message: String,
    },

    /// No connection attempt completed in time.
    #[error("Connecting to {address} timed out after {attempts} attempt(s), last timeout {timeout:?}")]
    ConnectTimeout {
        /// Device address.
        address: String,
        /// Number of attempts made.
        attempts: u32,
        /// Timeout of the last attempt.
        timeout: Duration,
    },

    /// An operation needs a connection but the client is disconnected.
    #[error("Not connected. Call connect() first.")]
    NotConnected,

    /// The device does not expose the Comet Blue service.
    #[error("Device {address} does not expose the Comet Blue service")]
    ServiceNotFound {
        /// Device address.
        address: String,
    },

    /// The Comet Blue service lacks an expected characteristic.
    #[error("Characteristic {uuid} not found on the device")]
    CharacteristicNotFound {
        /// Characteristic UUID.
        uuid: Uuid,
    },

    /// A GATT read or write failed.
    #[error("GATT {operation} of {characteristic} failed: {message}")]
    Gatt {
        /// `"read"` or `"write"`.
        operation: &'static str,
        /// Characteristic name.
        characteristic: &'static str,
        /// Backend error message.
        message: String,
    },

    /// Scanning for devices failed.
    #[error("Bluetooth discovery failed: {message}")]
    DiscoveryFailed {
        /// Backend error message.
        message: String,
    },
}

/// Result type for the Bluetooth layer.
pub type BluetoothResult<T> = std::result::Result<T, BluetoothError>;

impl BluetoothError {
    /// Returns `true` for failures that may clear up on their own.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound { .. } | Self::ConnectFailed { .. } | Self::ConnectTimeout { .. }
        )
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::AdapterPoweredOff => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::SessionInitFailed { .. } => "BLUETOOTH_SESSION_FAILED",
            Self::InvalidAddress { .. } => "INVALID_ADDRESS",
            Self::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
            Self::ConnectFailed { .. } => "CONNECT_FAILED",
            Self::ConnectTimeout { .. } => "CONNECT_TIMEOUT",
            Self::NotConnected => "NOT_CONNECTED",
            Self::ServiceNotFound { .. } => "SERVICE_NOT_FOUND",
            Self::CharacteristicNotFound { .. } => "CHARACTERISTIC_NOT_FOUND",
            Self::Gatt { .. } => "GATT_ERROR",
            Self::DiscoveryFailed { .. } => "DISCOVERY_FAILED",
        }
    }
}

/// Link to one valve.
///
/// Implementations only move bytes. Retries, timeouts and the PIN handshake
/// are handled by [`crate::CometBlue`].
pub trait GattTransport: Send + Sync {
    /// Address of the device, for diagnostics.
    fn address(&self) -> &str;

    /// Establish the link and resolve the Comet Blue characteristics.
    fn connect(&mut self) -> impl Future<Output = BluetoothResult<()>> + Send;

    /// Tear down the link.
    fn disconnect(&mut self) -> impl Future<Output = BluetoothResult<()>> + Send;

    /// Read a characteristic.
    fn read(&self, characteristic: Uuid) -> impl Future<Output = BluetoothResult<Vec<u8>>> + Send;

    /// Write a characteristic and wait for the device to acknowledge it.
    fn write(
        &self,
        characteristic: Uuid,
        value: &[u8],
    ) -> impl Future<Output = BluetoothResult<()>> + Send;
}

/// A valve seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Bluetooth MAC address.
    pub address: String,

    /// Advertised name, if any.
    pub name: Option<String>,

    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// `true` if the advertised service UUIDs identify a Comet Blue valve.
#[must_use]
pub fn is_comet_blue<S: std::hash::BuildHasher>(advertised: &HashSet<Uuid, S>) -> bool {
    advertised.contains(&uuids::SERVICE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_comet_blue() {
        let mut advertised = HashSet::new();
        assert!(!is_comet_blue(&advertised));

        advertised.insert(Uuid::from_u128(0x0000_180f_0000_1000_8000_0080_5f9b_34fb));
        assert!(!is_comet_blue(&advertised));

        advertised.insert(uuids::SERVICE);
        assert!(is_comet_blue(&advertised));
    }

    #[test]
    fn test_transient_errors() {
        assert!(BluetoothError::ConnectFailed {
            address: "AA:BB:CC:DD:EE:FF".into(),
            message: "le-connection-abort-by-local".into(),
        }
        .is_transient());
        assert!(!BluetoothError::NotConnected.is_transient());
        assert!(!BluetoothError::AdapterPoweredOff.is_transient());
    }

    #[test]
    fn test_characteristic_not_found_names_the_uuid() {
        let err = BluetoothError::CharacteristicNotFound {
            uuid: uuids::BATTERY,
        };
        assert!(err.to_string().contains("47e9ee2c"));
    }

    #[test]
    fn test_discovered_device_serialization() {
        let device = DiscoveredDevice {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            name: Some("Comet Blue".to_string()),
            rssi: Some(-71),
        };
        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("\"rssi\":-71"));
    }
}
