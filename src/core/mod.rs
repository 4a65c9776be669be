//! Core subsystem: error taxonomy and TOML configuration.

pub mod config;
pub mod errors;

pub use config::{MonitorTarget, SentryConfig};
pub use errors::{Result, SentryError};
