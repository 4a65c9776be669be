//! Ping staleness check: no active probing, just receipt-timestamp age
//! against a threshold.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::alarm::event::EventOrigin;
use crate::alarm::relay::AlarmRelay;
use crate::core::config::PingSettings;
use crate::logger::Logger;
use crate::watchdog::lifecycle::{identity_jitter, CancelToken};
use crate::watchdog::Watchdog;

const PING_SOURCE: &str = "pingmon";
const PING_CODE: &str = "PingStale";

/// Receipt timestamp for one ping target, updated by an external ICMP
/// listener through [`PingTargetState::mark_received`]; the watchdog only
/// reads it. Initializes to the construction instant so a fresh target gets
/// a full threshold of grace before alarming.
pub struct PingTargetState {
    host: String,
    last_received: Mutex<Instant>,
}

impl PingTargetState {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            last_received: Mutex::new(Instant::now()),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Stamp a successful receipt now.
    pub fn mark_received(&self) {
        *self.last_received.lock() = Instant::now();
    }

    /// Time since the last receipt, as seen from `now`.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_received.lock())
    }
}

/// Check timings; defaults are the production constants.
#[derive(Debug, Clone, Copy)]
pub struct PingTimings {
    pub threshold: Duration,
    pub period: Duration,
    pub settle: Duration,
}

impl Default for PingTimings {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(900),
            period: Duration::from_secs(120),
            settle: Duration::from_secs(60),
        }
    }
}

impl From<&PingSettings> for PingTimings {
    fn from(settings: &PingSettings) -> Self {
        Self {
            threshold: settings.threshold(),
            period: settings.period(),
            settle: settings.settle(),
        }
    }
}

/// Level-triggered staleness watchdog: every check cycle re-alarms every
/// target whose receipt age exceeds the threshold, unlike the edge-triggered
/// TCP probe. Targets are evaluated independently and may alarm in the same
/// cycle.
pub struct PingStalenessWatchdog {
    origin: EventOrigin,
    targets: Vec<Arc<PingTargetState>>,
    timings: PingTimings,
    relay: Arc<AlarmRelay>,
    logger: Logger,
}

impl PingStalenessWatchdog {
    #[must_use]
    pub fn new(
        origin: EventOrigin,
        targets: Vec<Arc<PingTargetState>>,
        timings: PingTimings,
        relay: Arc<AlarmRelay>,
        logger: Logger,
    ) -> Self {
        Self {
            origin,
            targets,
            timings,
            relay,
            logger,
        }
    }

    /// Hosts whose receipt age exceeds the threshold at `now`, with the age.
    #[must_use]
    pub fn stale_targets(&self, now: Instant) -> Vec<(String, Duration)> {
        self.targets
            .iter()
            .filter_map(|target| {
                let age = target.age(now);
                (age > self.timings.threshold).then(|| (target.host().to_string(), age))
            })
            .collect()
    }
}

impl Watchdog for PingStalenessWatchdog {
    fn name(&self) -> String {
        PING_SOURCE.to_string()
    }

    fn startup_delay(&self) -> Duration {
        self.timings.settle + identity_jitter(PING_SOURCE, self.timings.period)
    }

    fn period(&self) -> Duration {
        self.timings.period
    }

    fn run_cycle(&mut self, _cancel: &CancelToken) {
        for (host, age) in self.stale_targets(Instant::now()) {
            let event = self.origin.event(
                PING_SOURCE,
                PING_CODE,
                format!("no ping from {host} for {}s", age.as_secs()),
            );
            let status = self.relay.emit(&event);
            self.logger.stamped(&format!(
                "ping target {host} stale for {}s, alarm {status:?}",
                age.as_secs()
            ));
        }
    }
}
