//! Signal handling: forward SIGINT/SIGTERM into the daemon shutdown
//! channel.

use crossbeam_channel::Sender;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::core::errors::{Result, SentryError};
use crate::daemon::runtime::Shutdown;

/// Spawn the signal-watcher thread. Every SIGINT/SIGTERM re-sends
/// `Shutdown::Signal`; the shutdown channel holds one slot, so repeats while
/// teardown is underway are dropped.
pub fn forward_to(shutdown: Sender<Shutdown>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|err| SentryError::io("signal registration", err))?;
    std::thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || {
            for _signal in signals.forever() {
                let _ = shutdown.try_send(Shutdown::Signal);
            }
        })
        .map_err(|err| SentryError::io("signal thread spawn", err))?;
    Ok(())
}
