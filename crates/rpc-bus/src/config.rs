//! Bus configuration with validation.
//!
//! ```toml
//! request_timeout = "5s"
//! id_length = 16
//! max_message_size = 1048576
//! ```

use rpc_types::DEFAULT_ID_LENGTH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default per-call timeout (5 seconds)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default maximum inbound frame size (1MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Configuration shared by the call factories and socket transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Time a client call waits for its reply
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Length of generated correlation ids
    pub id_length: usize,
    /// Inbound text frames larger than this are dropped
    pub max_message_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            id_length: DEFAULT_ID_LENGTH,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl BusConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout cannot be 0".into(),
            ));
        }

        if self.id_length == 0 {
            return Err(ConfigError::Invalid("id_length cannot be 0".into()));
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "max_message_size cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }
}

/// Errors that can occur during config loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("Failed to read config {path}: {error}")]
    Io { path: String, error: String },

    /// TOML parse error.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// Value out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}
