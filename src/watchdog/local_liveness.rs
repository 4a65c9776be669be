//! Local liveness check: watches the process-wide alarm-side state counter
//! and logs when it stops looking alive.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::logger::Logger;
use crate::watchdog::lifecycle::{identity_jitter, CancelToken};
use crate::watchdog::Watchdog;

/// Process-wide `{state, loop_counter}` pair.
///
/// Written by the alarm-side component (the relay stamps it on every emit in
/// the standalone daemon; an embedding process may own the writes instead).
/// This watchdog only reads it.
#[derive(Debug)]
pub struct LivenessState {
    state: AtomicI64,
    loops: AtomicU64,
}

impl LivenessState {
    /// State value of a healthy alarm side.
    pub const ALIVE: i64 = 1;
    /// State value stamped while sends are being dropped.
    pub const DEGRADED: i64 = 2;

    /// Starts alive with a zero loop count: a quiet alarm side is healthy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicI64::new(Self::ALIVE),
            loops: AtomicU64::new(0),
        }
    }

    pub fn mark(&self, state: i64) {
        self.state.store(state, Ordering::Relaxed);
    }

    pub fn tick(&self) {
        self.loops.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn state(&self) -> i64 {
        self.state.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn loops(&self) -> u64 {
        self.loops.load(Ordering::Relaxed)
    }
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads [`LivenessState`] on a fixed period and logs any deviation from the
/// expected alive value.
///
/// Deviations go to the logger, not the relay: if this check fails, the
/// alarm path itself is suspect and routing the report through it would be
/// circular.
pub struct LocalLivenessWatchdog {
    state: Arc<LivenessState>,
    expected: i64,
    period: Duration,
    logger: Logger,
}

impl LocalLivenessWatchdog {
    #[must_use]
    pub fn new(state: Arc<LivenessState>, expected: i64, period: Duration, logger: Logger) -> Self {
        Self {
            state,
            expected,
            period,
            logger,
        }
    }

    /// The deviation this cycle would report: observed state plus loop
    /// count, or `None` while healthy.
    #[must_use]
    pub fn deviation(&self) -> Option<(i64, u64)> {
        let observed = self.state.state();
        (observed != self.expected).then(|| (observed, self.state.loops()))
    }
}

impl Watchdog for LocalLivenessWatchdog {
    fn name(&self) -> String {
        "liveness".to_string()
    }

    fn startup_delay(&self) -> Duration {
        identity_jitter(&self.name(), self.period)
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn run_cycle(&mut self, _cancel: &CancelToken) {
        if let Some((state, loops)) = self.deviation() {
            self.logger.stamped(&format!(
                "liveness check: alarm state {state} (expected {}), loop count {loops}",
                self.expected
            ));
        }
    }
}
