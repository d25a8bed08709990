//! # cometblue-core
//!
//! Client library for Eurotronic Comet Blue Bluetooth LE radiator valves.
//!
//! This crate provides:
//! - Reading and setting temperatures, the clock and the manual mode flag
//! - Reading and writing the weekly heating schedule and holiday slots
//! - Discovery of nearby valves (Linux, BlueZ)
//! - A TOML configuration file with named devices
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`client`] - The [`CometBlue`] client, one method per device operation
//! - [`bluetooth`] - The [`GattTransport`] seam, the BlueZ backend and a mock
//! - [`protocol`] - Byte layouts of every characteristic
//! - [`uuids`] - GATT service and characteristic UUIDs
//! - [`types`] - Temperatures, schedules, holidays and other domain values
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod bluetooth;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod types;
pub mod uuids;

// Re-export primary types for convenience
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use bluetooth::MockTransport;
pub use bluetooth::{BluetoothError, BluetoothResult, DiscoveredDevice, GattTransport};
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluerTransport;
pub use client::{CometBlue, ConnectionOptions};
pub use config::{
    default_config_path, is_valid_mac_address, ClientConfig, ConfigError, ConfigResult,
    DeviceEntry,
};
pub use error::{CometBlueError, Error, Result};
pub use protocol::ProtocolError;
pub use types::{
    DaySchedule, DeviceStatus, HeatingPeriod, Holiday, HolidaySlot, Pin, Temperature,
    TemperatureReading, TemperatureUpdate,
};
