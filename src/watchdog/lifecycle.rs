//! Watchdog runner: one named thread per strategy, channel-based
//! cancellation, deterministic startup jitter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::core::errors::{Result, SentryError};
use crate::logger::Logger;
use crate::watchdog::Watchdog;

/// Cancellation side of a [`CancelToken`]. Firing it (or dropping it)
/// cancels the token; there is no way to un-cancel.
pub struct Canceller {
    _tx: Sender<()>,
}

impl Canceller {
    /// Cancel the paired token.
    pub fn cancel(self) {
        drop(self);
    }
}

/// Cooperative cancellation handle passed into every watchdog cycle.
///
/// Loops must route timed waits through [`CancelToken::wait`] and check
/// [`CancelToken::is_cancelled`] at cycle boundaries so termination is
/// observed within one period.
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    /// True once termination has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Interruptible sleep: waits up to `timeout`, returning `true` if
    /// cancellation arrived during the wait.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}

/// A standalone canceller/token pair. The runner wires its own pair up in
/// [`spawn`]; embedders driving `run_cycle` on their own scheduler make one
/// here.
#[must_use]
pub fn cancel_pair() -> (Canceller, CancelToken) {
    let (tx, rx) = bounded(0);
    (Canceller { _tx: tx }, CancelToken { rx })
}

/// Running watchdog thread. Terminate and join are both idempotent and safe
/// from any thread.
pub struct WatchdogHandle {
    name: String,
    canceller: Mutex<Option<Canceller>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WatchdogHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request the loop to exit at its next wait or cycle boundary. The
    /// canceller is taken under the lock, so a second call finds nothing to
    /// fire and is a no-op.
    pub fn terminate(&self) {
        if let Some(canceller) = self.canceller.lock().take() {
            canceller.cancel();
        }
    }

    /// False once the loop has exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait for the thread to finish. Callers terminate first; joining a
    /// live loop blocks until its next wait observes cancellation.
    pub fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// Spawn a strategy on its own named thread and hand back the control
/// handle.
///
/// The runner sleeps out `startup_delay`, then alternates `run_cycle` with
/// a `period`-long interruptible wait until the token is cancelled.
pub fn spawn(mut strategy: Box<dyn Watchdog>, logger: Logger) -> Result<WatchdogHandle> {
    let (canceller, token) = cancel_pair();
    let running = Arc::new(AtomicBool::new(true));
    let loop_running = Arc::clone(&running);
    let name = strategy.name();

    let thread = thread::Builder::new()
        .name(format!("watchdog-{name}"))
        .spawn(move || {
            let delay = strategy.startup_delay();
            let period = strategy.period();
            logger.stamped(&format!(
                "watchdog {} started (first cycle in {}s, period {}s)",
                strategy.name(),
                delay.as_secs(),
                period.as_secs()
            ));
            if !token.wait(delay) {
                loop {
                    strategy.run_cycle(&token);
                    if token.is_cancelled() || token.wait(strategy.period()) {
                        break;
                    }
                }
            }
            loop_running.store(false, Ordering::Release);
            logger.stamped(&format!("watchdog {} stopped", strategy.name()));
        })
        .map_err(|err| SentryError::io("watchdog thread spawn", err))?;

    Ok(WatchdogHandle {
        name,
        canceller: Mutex::new(Some(canceller)),
        running,
        thread: Mutex::new(Some(thread)),
    })
}

/// Deterministic startup jitter: first eight bytes of the SHA-256 of the
/// target's identity key, reduced modulo the period. Identical keys always
/// jitter identically, so restarted daemons keep their probe phase while
/// distinct targets spread out.
#[must_use]
pub fn identity_jitter(key: &str, period: Duration) -> Duration {
    let span = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
    if span == 0 {
        return Duration::ZERO;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    Duration::from_millis(u64::from_be_bytes(word) % span)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{cancel_pair, identity_jitter};

    #[test]
    fn token_reports_cancellation() {
        let (canceller, token) = cancel_pair();
        assert!(!token.is_cancelled());
        canceller.cancel();
        assert!(token.is_cancelled());
        assert!(token.is_cancelled()); // stays cancelled
    }

    #[test]
    fn wait_times_out_without_cancellation() {
        let (_canceller, token) = cancel_pair();
        let begun = Instant::now();
        assert!(!token.wait(Duration::from_millis(20)));
        assert!(begun.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_wakes_early_on_cancel() {
        let (canceller, token) = cancel_pair();
        let waker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            canceller.cancel();
        });
        assert!(token.wait(Duration::from_secs(30)));
        waker.join().expect("waker thread");
    }

    #[test]
    fn jitter_is_deterministic_and_bounded() {
        let period = Duration::from_secs(60);
        let first = identity_jitter("dc1-acq01:16001:acqproc", period);
        let second = identity_jitter("dc1-acq01:16001:acqproc", period);
        assert_eq!(first, second);
        assert!(first < period);
        assert_ne!(
            identity_jitter("dc1-acq01:16001:acqproc", period),
            identity_jitter("dc2-acq01:16001:acqproc", period),
        );
    }

    #[test]
    fn jitter_of_zero_period_is_zero() {
        assert_eq!(
            identity_jitter("anything", Duration::ZERO),
            Duration::ZERO
        );
    }
}
