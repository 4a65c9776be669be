//! TCP process probe: connect, drain the unprompted status text, classify
//! by reply length.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::alarm::event::EventOrigin;
use crate::alarm::relay::AlarmRelay;
use crate::core::config::{MonitorTarget, ProbeSettings};
use crate::core::errors::{Result, SentryError};
use crate::logger::Logger;
use crate::watchdog::discipline::{AlarmDecision, FailureStreak};
use crate::watchdog::lifecycle::{identity_jitter, CancelToken};
use crate::watchdog::Watchdog;

const PROBE_SOURCE: &str = "portmon";
const PROBE_CODE: &str = "MonPortFail";

/// Replies longer than this mark the process healthy.
const STATUS_MIN_BYTES: usize = 10;
/// Initial receive buffer; doubled whenever a reply fills it.
const INITIAL_REPLY_CAPACITY: usize = 2048;
/// The only recognized target action; anything else is a logged no-op.
const ALARM_ACTION: &str = "alarm";

/// Probe timings; defaults are the production constants.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTimings {
    pub period: Duration,
    /// Bounds both connect and the status-text drain.
    pub read_timeout: Duration,
}

impl Default for ProbeTimings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            read_timeout: Duration::from_secs(120),
        }
    }
}

impl From<&ProbeSettings> for ProbeTimings {
    fn from(settings: &ProbeSettings) -> Self {
        Self {
            period: settings.period(),
            read_timeout: settings.read_timeout(),
        }
    }
}

/// Edge-triggered TCP liveness probe for one monitor target.
///
/// The monitored process pushes its status text unprompted on connect; the
/// probe sends nothing. Connection errors, resolution failures and short
/// replies all count as failures; the loop itself never dies over them.
pub struct ProcessHealthMonitor {
    target: MonitorTarget,
    origin: EventOrigin,
    timings: ProbeTimings,
    streak: FailureStreak,
    relay: Arc<AlarmRelay>,
    logger: Logger,
}

impl ProcessHealthMonitor {
    #[must_use]
    pub fn new(
        target: MonitorTarget,
        origin: EventOrigin,
        timings: ProbeTimings,
        relay: Arc<AlarmRelay>,
        logger: Logger,
    ) -> Self {
        Self {
            target,
            origin,
            timings,
            streak: FailureStreak::default(),
            relay,
            logger,
        }
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub fn failure_streak(&self) -> u32 {
        self.streak.consecutive()
    }

    /// Connect and read until the peer closes or the read times out. A
    /// timeout ends the drain and whatever arrived gets classified; only
    /// resolution, connect and hard read errors are `Err`.
    fn read_status(target: &MonitorTarget, timeout: Duration) -> Result<Vec<u8>> {
        let address = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|err| SentryError::Resolve {
                host: target.host.clone(),
                details: err.to_string(),
            })?
            .next()
            .ok_or_else(|| SentryError::Resolve {
                host: target.host.clone(),
                details: "resolved to no addresses".to_string(),
            })?;
        let mut stream = TcpStream::connect_timeout(&address, timeout)
            .map_err(|err| SentryError::io("probe connect", err))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|err| SentryError::io("probe socket", err))?;

        let mut reply = vec![0u8; INITIAL_REPLY_CAPACITY];
        let mut filled = 0;
        loop {
            if filled == reply.len() {
                reply.resize(reply.len() * 2, 0);
            }
            match stream.read(&mut reply[filled..]) {
                Ok(0) => break, // peer closed
                Ok(count) => filled += count,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    break // drain window over; classify what arrived
                }
                Err(err) => return Err(SentryError::io("probe read", err)),
            }
        }
        reply.truncate(filled);
        Ok(reply)
    }

    fn record_failure(&mut self, detail: &str) {
        let decision = self.streak.failure();
        let streak = self.streak.consecutive();

        if self.target.action != ALARM_ACTION {
            // No-op extension point: the action table only knows "alarm".
            self.logger.stamped(&format!(
                "probe {} failure {streak}: {detail}; unknown action {:?}, no alarm sent",
                self.target.key(),
                self.target.action
            ));
            return;
        }

        match decision {
            AlarmDecision::Emit => {
                let event = self.origin.event(
                    PROBE_SOURCE,
                    PROBE_CODE,
                    format!("{} unreachable: {detail}", self.target.key()),
                );
                let status = self.relay.emit(&event);
                self.logger.stamped(&format!(
                    "probe {} failure {streak}: {detail}; alarm {status:?}",
                    self.target.key()
                ));
            }
            AlarmDecision::Suppress => {
                if self.target.debug {
                    self.logger.stamped(&format!(
                        "probe {} failure {streak} suppressed: {detail}",
                        self.target.key()
                    ));
                }
            }
        }
    }
}

impl Watchdog for ProcessHealthMonitor {
    fn name(&self) -> String {
        format!("probe-{}", self.target.key())
    }

    fn startup_delay(&self) -> Duration {
        identity_jitter(&self.target.key(), self.timings.period)
    }

    fn period(&self) -> Duration {
        self.timings.period
    }

    fn run_cycle(&mut self, _cancel: &CancelToken) {
        match Self::read_status(&self.target, self.timings.read_timeout) {
            Ok(reply) if reply.len() > STATUS_MIN_BYTES => {
                if self.streak.success() {
                    self.logger.stamped(&format!(
                        "probe {} healthy again ({} bytes)",
                        self.target.key(),
                        reply.len()
                    ));
                } else if self.target.debug {
                    self.logger.stamped(&format!(
                        "probe {} ok ({} bytes)",
                        self.target.key(),
                        reply.len()
                    ));
                }
            }
            Ok(reply) => self.record_failure(&format!("short status ({} bytes)", reply.len())),
            Err(err) => self.record_failure(&format!("[{}] {err}", err.code())),
        }
    }
}
