//! Watchdog strategies and their shared lifecycle: TCP process probe, ping
//! staleness, keepalive broadcast, local liveness.

pub mod discipline;
pub mod keepalive;
pub mod lifecycle;
pub mod local_liveness;
pub mod ping_staleness;
pub mod process_probe;

use std::time::Duration;

pub use discipline::{AlarmDecision, FailureStreak};
pub use keepalive::{KeepaliveBroadcaster, ListCursor, Station, StationCursor, StationSource};
#[cfg(feature = "sqlite")]
pub use keepalive::SqliteStationSource;
pub use lifecycle::{cancel_pair, identity_jitter, spawn, CancelToken, Canceller, WatchdogHandle};
pub use local_liveness::{LivenessState, LocalLivenessWatchdog};
pub use ping_staleness::{PingStalenessWatchdog, PingTargetState};
pub use process_probe::ProcessHealthMonitor;

/// One independently scheduled monitoring loop.
///
/// A strategy supplies the probe action and its timing; the runner in
/// [`lifecycle`] owns the thread, the startup delay and the between-cycle
/// wait. `run_cycle` must keep every internal wait on the token and contain
/// its own failures; nothing a cycle does may tear down the loop.
pub trait Watchdog: Send {
    /// Loop identity: thread name suffix and log prefix.
    fn name(&self) -> String;

    /// Delay before the first cycle; strategies fold their identity jitter
    /// in here so same-period loops do not probe in lock-step.
    fn startup_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Pause between cycles.
    fn period(&self) -> Duration;

    /// One probe/check cycle.
    fn run_cycle(&mut self, cancel: &CancelToken);
}
