//! # RPC Telemetry
//!
//! Structured logging for processes that host a bus.
//!
//! The bus crates only emit `tracing` events. This crate installs the global
//! subscriber that filters and formats them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rpc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RPC_SERVICE_NAME` | `duplex-rpc` | Service name attached to the startup record |
//! | `RPC_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `RPC_JSON_LOGS` | `false` | JSON formatted output |
//! | `RPC_CONSOLE_OUTPUT` | `true` | Write log records to stdout |

#![deny(unsafe_code)]
#![warn(clippy::all)]

mod config;
mod subscriber;

pub use config::TelemetryConfig;
pub use subscriber::init_telemetry;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}
