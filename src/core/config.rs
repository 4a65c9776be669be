//! TOML configuration: relay endpoint, monitor target specs, ping targets,
//! keepalive source, liveness check, logging.
//!
//! Every `*_secs` knob carries the production default from the wire/probe
//! contract but stays configurable so tests can run the same loops at
//! millisecond scale.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::alarm::relay::RelayConfig;
use crate::core::errors::{Result, SentryError};

/// Default UDP port keepalive datagrams are addressed to.
pub const DEFAULT_KEEPALIVE_PORT: u16 = 6334;

/// One configured `host:port:process:account:action` probe target.
///
/// Immutable after parsing; the owning watchdog keeps the mutable
/// failure-streak state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorTarget {
    pub host: String,
    pub port: u16,
    pub process: String,
    pub account: String,
    pub action: String,
    pub debug: bool,
}

static TARGET_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<host>[A-Za-z0-9._-]+):(?P<port>\d{1,5}):(?P<process>[^:\s]+):(?P<account>[^:\s]*):(?P<action>[^:\s]+)$",
    )
    .expect("target spec regex is well-formed")
});

impl MonitorTarget {
    /// Parse a `host:port:process:account:action` tuple. The account field
    /// may be empty; everything else must be present. Unknown `action`
    /// values are accepted here; they downgrade to a runtime warning, not
    /// a configuration failure.
    pub fn parse(spec: &str) -> Result<Self> {
        let caps = TARGET_SPEC.captures(spec).ok_or_else(|| SentryError::TargetSpec {
            spec: spec.to_string(),
            reason: "expected host:port:process:account:action".to_string(),
        })?;
        let port: u16 = caps["port"].parse().map_err(|_| SentryError::TargetSpec {
            spec: spec.to_string(),
            reason: "port out of range".to_string(),
        })?;
        if port == 0 {
            return Err(SentryError::TargetSpec {
                spec: spec.to_string(),
                reason: "port must be nonzero".to_string(),
            });
        }
        Ok(Self {
            host: caps["host"].to_string(),
            port,
            process: caps["process"].to_string(),
            account: caps["account"].to_string(),
            action: caps["action"].to_string(),
            debug: false,
        })
    }

    /// Stable identity used for jitter derivation and log lines.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.host, self.port, self.process)
    }
}

/// `[[monitor]]` entry: the raw spec string plus a per-target debug flag.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorEntry {
    pub spec: String,
    #[serde(default)]
    pub debug: bool,
}

impl MonitorEntry {
    /// Parse into a [`MonitorTarget`], carrying the debug flag along.
    pub fn target(&self) -> Result<MonitorTarget> {
        let mut target = MonitorTarget::parse(&self.spec)?;
        target.debug = self.debug;
        Ok(target)
    }
}

fn default_probe_period() -> u64 {
    60 // one probe cycle per minute
}

fn default_probe_read_timeout() -> u64 {
    120 // bound on connect + status-text drain
}

/// `[probe]`: shared timings for every TCP process monitor.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "default_probe_period")]
    pub period_secs: u64,
    #[serde(default = "default_probe_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            period_secs: default_probe_period(),
            read_timeout_secs: default_probe_read_timeout(),
        }
    }
}

impl ProbeSettings {
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_ping_threshold() -> u64 {
    900 // fifteen minutes without an echo reply is stale
}

fn default_ping_period() -> u64 {
    120
}

fn default_ping_settle() -> u64 {
    60 // give the ICMP listener a head start after boot
}

/// `[ping]`: staleness check over externally stamped receipt times.
#[derive(Debug, Clone, Deserialize)]
pub struct PingSettings {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default = "default_ping_threshold")]
    pub threshold_secs: u64,
    #[serde(default = "default_ping_period")]
    pub period_secs: u64,
    #[serde(default = "default_ping_settle")]
    pub settle_secs: u64,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            threshold_secs: default_ping_threshold(),
            period_secs: default_ping_period(),
            settle_secs: default_ping_settle(),
        }
    }
}

impl PingSettings {
    #[must_use]
    pub const fn threshold(&self) -> Duration {
        Duration::from_secs(self.threshold_secs)
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

fn default_keepalive_protocol() -> String {
    "udp".to_string()
}

fn default_keepalive_port() -> u16 {
    DEFAULT_KEEPALIVE_PORT
}

fn default_keepalive_interval() -> u64 {
    120
}

fn default_keepalive_backoff() -> u64 {
    30
}

/// `[keepalive]`: station-list broadcast; the section is optional and its
/// absence disables the broadcaster.
#[derive(Debug, Clone, Deserialize)]
pub struct KeepaliveSettings {
    pub db_path: PathBuf,
    #[serde(default = "default_keepalive_protocol")]
    pub protocol: String,
    #[serde(default = "default_keepalive_port")]
    pub port: u16,
    #[serde(default = "default_keepalive_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_keepalive_backoff")]
    pub backoff_secs: u64,
}

impl KeepaliveSettings {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

fn default_liveness_period() -> u64 {
    120
}

fn default_liveness_expected() -> i64 {
    1 // the alarm-side component stamps 1 while healthy
}

/// `[liveness]`: local alarm-thread staleness check.
#[derive(Debug, Clone, Deserialize)]
pub struct LivenessSettings {
    #[serde(default = "default_liveness_period")]
    pub period_secs: u64,
    #[serde(default = "default_liveness_expected")]
    pub expected_state: i64,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            period_secs: default_liveness_period(),
            expected_state: default_liveness_expected(),
        }
    }
}

impl LivenessSettings {
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// `[log]`: optional append-to-file log destination; stderr otherwise.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_node() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_process() -> String {
    "fsentry".to_string()
}

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct SentryConfig {
    /// Originating host name stamped into every alarm event.
    #[serde(default = "default_node")]
    pub node: String,
    /// Originating process name stamped into every alarm event.
    #[serde(default = "default_process")]
    pub process: String,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default, rename = "monitor")]
    pub monitors: Vec<MonitorEntry>,
    #[serde(default)]
    pub ping: PingSettings,
    #[serde(default)]
    pub keepalive: Option<KeepaliveSettings>,
    #[serde(default)]
    pub liveness: LivenessSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            process: default_process(),
            relay: RelayConfig::default(),
            probe: ProbeSettings::default(),
            monitors: Vec::new(),
            ping: PingSettings::default(),
            keepalive: None,
            liveness: LivenessSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl SentryConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SentryError::MissingConfig {
                    path: path.to_path_buf(),
                }
            } else {
                SentryError::io("config file", source)
            }
        })?;
        Self::from_toml(&text)
    }

    /// Parse every `[[monitor]]` entry, failing on the first malformed spec.
    pub fn monitor_targets(&self) -> Result<Vec<MonitorTarget>> {
        self.monitors.iter().map(MonitorEntry::target).collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.node.is_empty() {
            return Err(SentryError::InvalidConfig {
                details: "node must not be empty".to_string(),
            });
        }
        if self.relay.handler_port == 0 {
            return Err(SentryError::InvalidConfig {
                details: "relay.handler_port must be nonzero".to_string(),
            });
        }
        if self.probe.period_secs == 0 || self.probe.read_timeout_secs == 0 {
            return Err(SentryError::InvalidConfig {
                details: "probe periods must be nonzero".to_string(),
            });
        }
        if self.ping.threshold_secs == 0 || self.ping.period_secs == 0 {
            return Err(SentryError::InvalidConfig {
                details: "ping threshold and period must be nonzero".to_string(),
            });
        }
        if let Some(keepalive) = &self.keepalive {
            if keepalive.db_path.as_os_str().is_empty() {
                return Err(SentryError::InvalidConfig {
                    details: "keepalive.db_path must not be empty".to_string(),
                });
            }
            if keepalive.protocol.is_empty() {
                return Err(SentryError::InvalidConfig {
                    details: "keepalive.protocol must not be empty".to_string(),
                });
            }
            if keepalive.port == 0 || keepalive.interval_secs == 0 || keepalive.backoff_secs == 0 {
                return Err(SentryError::InvalidConfig {
                    details: "keepalive port, interval and backoff must be nonzero".to_string(),
                });
            }
        }
        if self.liveness.period_secs == 0 {
            return Err(SentryError::InvalidConfig {
                details: "liveness.period_secs must be nonzero".to_string(),
            });
        }
        self.monitor_targets().map(|_| ())
    }
}
