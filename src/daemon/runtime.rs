//! Daemon assembly: build the relay, spawn every configured watchdog, run
//! until shutdown is requested.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::alarm::event::EventOrigin;
use crate::alarm::relay::AlarmRelay;
use crate::core::config::{LogSettings, SentryConfig};
use crate::core::errors::Result;
use crate::logger::{FanoutSink, FileSink, Logger, StderrSink};
#[cfg(feature = "sqlite")]
use crate::watchdog::keepalive::KeepaliveTimings;
use crate::watchdog::ping_staleness::PingTimings;
use crate::watchdog::process_probe::ProbeTimings;
#[cfg(feature = "sqlite")]
use crate::watchdog::{KeepaliveBroadcaster, SqliteStationSource};
use crate::watchdog::{
    self, LivenessState, LocalLivenessWatchdog, PingStalenessWatchdog, PingTargetState,
    ProcessHealthMonitor, Watchdog, WatchdogHandle,
};

/// Why the daemon stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// SIGINT/SIGTERM arrived.
    Signal,
    /// An embedder or test asked for shutdown.
    Requested,
}

/// Build the configured logger: stderr alone, or stderr plus an append-only
/// log file.
pub fn build_logger(settings: &LogSettings) -> Result<Logger> {
    match &settings.path {
        Some(path) => {
            let file = FileSink::open(path)?;
            let sinks: Vec<Logger> = vec![Arc::new(StderrSink), Arc::new(file)];
            Ok(Arc::new(FanoutSink::new(sinks)))
        }
        None => Ok(Arc::new(StderrSink)),
    }
}

/// A running fleet sentry: the shared relay plus one thread per watchdog.
pub struct Daemon {
    relay: Arc<AlarmRelay>,
    liveness: Arc<LivenessState>,
    ping_targets: Vec<Arc<PingTargetState>>,
    handles: Vec<WatchdogHandle>,
    logger: Logger,
    shutdown_tx: Sender<Shutdown>,
    shutdown_rx: Receiver<Shutdown>,
}

impl fmt::Debug for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Daemon")
            .field("watchdogs", &self.handles.len())
            .field("ping_targets", &self.ping_targets.len())
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Validate the configuration, assemble every component and spawn the
    /// watchdog threads.
    pub fn start(config: &SentryConfig, logger: Logger) -> Result<Self> {
        config.validate()?;

        let origin = EventOrigin::new(config.node.clone(), config.process.clone());
        let relay = Arc::new(AlarmRelay::new(config.relay.clone(), logger.clone()));
        let liveness = Arc::new(LivenessState::new());
        relay.track_liveness(liveness.clone());

        let mut strategies: Vec<Box<dyn Watchdog>> = Vec::new();

        for target in config.monitor_targets()? {
            strategies.push(Box::new(ProcessHealthMonitor::new(
                target,
                origin.clone(),
                ProbeTimings::from(&config.probe),
                relay.clone(),
                logger.clone(),
            )));
        }

        let mut ping_targets = Vec::new();
        if !config.ping.targets.is_empty() {
            ping_targets = config
                .ping
                .targets
                .iter()
                .map(|host| Arc::new(PingTargetState::new(host.clone())))
                .collect::<Vec<_>>();
            strategies.push(Box::new(PingStalenessWatchdog::new(
                origin.clone(),
                ping_targets.clone(),
                PingTimings::from(&config.ping),
                relay.clone(),
                logger.clone(),
            )));
        }

        if let Some(keepalive) = &config.keepalive {
            #[cfg(feature = "sqlite")]
            {
                let source =
                    SqliteStationSource::new(keepalive.db_path.clone(), keepalive.protocol.clone());
                strategies.push(Box::new(KeepaliveBroadcaster::new(
                    &origin,
                    Box::new(source),
                    keepalive.port,
                    KeepaliveTimings::from(keepalive),
                    logger.clone(),
                )));
            }
            #[cfg(not(feature = "sqlite"))]
            logger.stamped(&format!(
                "keepalive configured ({}) but sqlite support is not built in; broadcaster disabled",
                keepalive.db_path.display()
            ));
        }

        strategies.push(Box::new(LocalLivenessWatchdog::new(
            liveness.clone(),
            config.liveness.expected_state,
            config.liveness.period(),
            logger.clone(),
        )));

        let mut handles = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            handles.push(watchdog::spawn(strategy, logger.clone())?);
        }

        let relay_line = relay
            .handler_endpoint()
            .map_or("relaying disabled".to_string(), |(host, port)| {
                format!("relaying to {host}:{port}")
            });
        logger.stamped(&format!(
            "fleet sentry up on {}: {} watchdogs, {relay_line}",
            origin.node(),
            handles.len()
        ));

        let (shutdown_tx, shutdown_rx) = bounded(1);
        Ok(Self {
            relay,
            liveness,
            ping_targets,
            handles,
            logger,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Shared alarm sink, for embedders that emit their own events.
    #[must_use]
    pub fn relay(&self) -> Arc<AlarmRelay> {
        Arc::clone(&self.relay)
    }

    /// Alarm-side liveness counter observed by the liveness watchdog.
    #[must_use]
    pub fn liveness(&self) -> Arc<LivenessState> {
        Arc::clone(&self.liveness)
    }

    /// Receipt-time handles, one per configured ping target. An external
    /// ICMP listener stamps these via `mark_received`.
    #[must_use]
    pub fn ping_targets(&self) -> &[Arc<PingTargetState>] {
        &self.ping_targets
    }

    /// Handles of every spawned watchdog, in spawn order.
    #[must_use]
    pub fn watchdogs(&self) -> &[WatchdogHandle] {
        &self.handles
    }

    /// Sender half of the shutdown channel, cloned for signal handlers.
    #[must_use]
    pub fn shutdown_handle(&self) -> Sender<Shutdown> {
        self.shutdown_tx.clone()
    }

    /// Ask the daemon to stop; `wait` will return.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.try_send(Shutdown::Requested);
    }

    /// Block until a shutdown request arrives.
    pub fn wait(&self) -> Shutdown {
        // The daemon holds one sender itself, so recv cannot disconnect
        // while `self` is alive.
        self.shutdown_rx.recv().unwrap_or(Shutdown::Requested)
    }

    /// Terminate every watchdog and join the threads.
    pub fn stop(&self) {
        for handle in &self.handles {
            handle.terminate();
        }
        for handle in &self.handles {
            handle.join();
        }
        self.logger.stamped("fleet sentry stopped");
    }
}

/// Run a daemon to completion: spawn, forward signals into the shutdown
/// channel, wait, tear down.
pub fn run(config: &SentryConfig, logger: Logger) -> Result<()> {
    let daemon = Daemon::start(config, logger.clone())?;
    #[cfg(feature = "daemon")]
    crate::daemon::signals::forward_to(daemon.shutdown_handle())?;
    let reason = daemon.wait();
    logger.stamped(&format!("fleet sentry shutting down ({reason:?})"));
    daemon.stop();
    Ok(())
}
