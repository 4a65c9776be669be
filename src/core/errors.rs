//! FSY-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SentryError>;

/// Top-level error type for Fleet Sentry.
#[derive(Debug, Error)]
pub enum SentryError {
    #[error("[FSY-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FSY-1002] missing configuration file: {}", path.display())]
    MissingConfig { path: PathBuf },

    #[error("[FSY-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[FSY-1004] malformed monitor target spec {spec:?}: {reason}")]
    TargetSpec { spec: String, reason: String },

    #[error("[FSY-2001] address resolution failure for {host}: {details}")]
    Resolve { host: String, details: String },

    #[error("[FSY-2101] alarm datagram decode failure: {details}")]
    Decode { details: String },

    #[error("[FSY-2201] data-source failure in {context}: {details}")]
    DataSource {
        context: &'static str,
        details: String,
    },

    #[error("[FSY-2301] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[FSY-3002] IO failure in {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("[FSY-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[FSY-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SentryError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FSY-1001",
            Self::MissingConfig { .. } => "FSY-1002",
            Self::ConfigParse { .. } => "FSY-1003",
            Self::TargetSpec { .. } => "FSY-1004",
            Self::Resolve { .. } => "FSY-2001",
            Self::Decode { .. } => "FSY-2101",
            Self::DataSource { .. } => "FSY-2201",
            Self::Serialization { .. } => "FSY-2301",
            Self::Io { .. } => "FSY-3002",
            Self::ChannelClosed { .. } => "FSY-3003",
            Self::Runtime { .. } => "FSY-3900",
        }
    }

    /// Whether retrying on the owning watchdog's normal schedule might
    /// resolve the failure. Configuration and decode failures are not
    /// transient; network and data-source outages are.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Resolve { .. }
                | Self::DataSource { .. }
                | Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known context.
    #[must_use]
    pub const fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Convenience constructor for free-form runtime failures.
    #[must_use]
    pub fn runtime(details: impl Into<String>) -> Self {
        Self::Runtime {
            details: details.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SentryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::DataSource {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for SentryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SentryError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
