//! Daemon subsystem: watchdog assembly, run-until-shutdown loop, signal
//! handling.

pub mod runtime;
#[cfg(feature = "daemon")]
pub mod signals;

pub use runtime::{build_logger, run, Daemon, Shutdown};
