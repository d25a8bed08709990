//! Client configuration management.
//!
//! Handles loading, saving, and validating the client configuration:
//! - Bluetooth adapter to use
//! - Connection timeout and attempts
//! - Discovery duration
//! - Known valves with their addresses and PINs
//!
//! Configuration is layered with the `config` crate: an optional TOML file,
//! then environment variables prefixed with `COMETBLUE` (`__` separates
//! nested keys, e.g. `COMETBLUE_CONNECT_TIMEOUT_SECS=4`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::client::ConnectionOptions;
use crate::protocol::ProtocolError;
use crate::types::Pin;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "COMETBLUE";

/// Upper bound for `connect_attempts`.
pub const MAX_CONNECT_ATTEMPTS: u32 = 10;

static MAC_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("MAC address regex is valid")
});

/// `true` if `address` has the form `XX:XX:XX:XX:XX:XX` (hex digits, any case).
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS.is_match(address)
}

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found at: {0}")]
    NotFound(String),

    /// The configuration file could not be written.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The layered configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A field holds an invalid value.
    #[error("Invalid {field}: {message}")]
    ValidationError {
        /// Field path, e.g. `devices[0].address`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors: {}", .0.len(), join_errors(.0))]
    MultipleValidationErrors(Vec<ConfigError>),

    /// No configured device matches the requested name or address.
    #[error("No configured device named '{0}'")]
    UnknownDevice(String),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "CONFIG_NOT_FOUND",
            Self::WriteError { .. } => "CONFIG_IO_ERROR",
            Self::ParseError(_) | Self::SerializeError(_) => "CONFIG_PARSE_ERROR",
            Self::ValidationError { .. } | Self::MultipleValidationErrors(_) => {
                "CONFIG_VALIDATION_ERROR"
            }
            Self::UnknownDevice(_) => "UNKNOWN_DEVICE",
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A valve known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Friendly name, e.g. `living-room`.
    pub name: String,

    /// Bluetooth MAC address.
    pub address: String,

    /// PIN of the valve. Factory default is 0.
    #[serde(default)]
    pub pin: u32,
}

impl DeviceEntry {
    /// The PIN as a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPin`] if the configured PIN is too long.
    pub fn pin(&self) -> Result<Pin, ProtocolError> {
        Pin::new(self.pin)
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// BlueZ adapter name (e.g. `hci0`). The default adapter is used if unset.
    pub adapter: Option<String>,

    /// Timeout of the first connection attempt, in seconds.
    pub connect_timeout_secs: u64,

    /// How many times to try connecting before giving up.
    pub connect_attempts: u32,

    /// How long to scan during discovery, in seconds.
    pub discovery_timeout_secs: u64,

    /// Known valves.
    pub devices: Vec<DeviceEntry>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            connect_timeout_secs: 2,
            connect_attempts: 1,
            discovery_timeout_secs: 5,
            devices: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `path` with environment overrides, then validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if `path` does not exist,
    /// [`ConfigError::ParseError`] for malformed input and a validation error
    /// for invalid values.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::build(Some(path))
    }

    /// Like [`ClientConfig::load`], but falls back to defaults (plus
    /// environment overrides) when `path` does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] for malformed input and a
    /// validation error for invalid values.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::build(Some(path))
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Self::build(None)
        }
    }

    fn build(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path` as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WriteError`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Check every field and report all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem and
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: String, message: &str| {
            errors.push(ConfigError::ValidationError {
                field,
                message: message.to_string(),
            });
        };

        if self.connect_timeout_secs == 0 {
            invalid("connect_timeout_secs".into(), "must be at least 1 second");
        }
        if !(1..=MAX_CONNECT_ATTEMPTS).contains(&self.connect_attempts) {
            invalid("connect_attempts".into(), "must be between 1 and 10");
        }
        if self.discovery_timeout_secs == 0 {
            invalid("discovery_timeout_secs".into(), "must be at least 1 second");
        }
        if self.adapter.as_deref().is_some_and(str::is_empty) {
            invalid("adapter".into(), "must not be empty");
        }

        for (i, device) in self.devices.iter().enumerate() {
            if device.name.trim().is_empty() {
                invalid(format!("devices[{i}].name"), "must not be empty");
            }
            if !is_valid_mac_address(&device.address) {
                invalid(
                    format!("devices[{i}].address"),
                    "expected format XX:XX:XX:XX:XX:XX",
                );
            }
            if device.pin().is_err() {
                invalid(format!("devices[{i}].pin"), "up to 8 digits are allowed");
            }
            if self.devices[..i].iter().any(|d| d.name == device.name) {
                invalid(format!("devices[{i}].name"), "is used by another device");
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Find a device by name, or by address ignoring case.
    #[must_use]
    pub fn device(&self, name_or_address: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.name == name_or_address).or_else(|| {
            self.devices
                .iter()
                .find(|d| d.address.eq_ignore_ascii_case(name_or_address))
        })
    }

    /// Connection policy derived from this configuration.
    #[must_use]
    pub const fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            timeout: Duration::from_secs(self.connect_timeout_secs),
            attempts: self.connect_attempts,
        }
    }

    /// How long discovery scans.
    #[must_use]
    pub const fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

/// Default location of the configuration file.
///
/// `~/.config/cometblue/config.toml` on Linux, the platform equivalent elsewhere.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "cometblue")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
