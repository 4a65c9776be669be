//! Process-wide alarm sink: one UDP socket, one lock, lazy bind, best-effort
//! delivery.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::alarm::event::AlarmEvent;
use crate::alarm::wire;
use crate::core::errors::{Result, SentryError};
use crate::logger::Logger;
use crate::watchdog::local_liveness::LivenessState;

/// Default UDP port of the central alarm event handler.
pub const DEFAULT_HANDLER_PORT: u16 = 7964;

fn default_handler_port() -> u16 {
    DEFAULT_HANDLER_PORT
}

/// `[relay]`: where alarm datagrams go. No `handler_host` means alarm
/// relaying is disabled and every emit is a successful no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub handler_host: Option<String>,
    #[serde(default = "default_handler_port")]
    pub handler_port: u16,
    /// Local UDP bind port; `0` picks an ephemeral port.
    #[serde(default)]
    pub local_bind_port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            handler_host: None,
            handler_port: DEFAULT_HANDLER_PORT,
            local_bind_port: 0,
        }
    }
}

/// Outcome of one `emit`. Never an error: delivery is best-effort and a
/// failed send only degrades to `Dropped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitStatus {
    /// Datagram handed to the socket.
    Sent,
    /// No handler configured; relaying is off.
    Disabled,
    /// Bind, resolution or send failed; datagram discarded for this call.
    Dropped,
}

/// Counter snapshot, one per `EmitStatus` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub sent: u64,
    pub dropped: u64,
    pub disabled: u64,
}

struct RelayInner {
    config: RelayConfig,
    /// Bound socket plus resolved handler address, set together on the first
    /// successful emit after (re)configuration.
    link: Option<(UdpSocket, SocketAddr)>,
}

/// Shared alarm sink. Exactly one per process; watchdogs hold it behind an
/// `Arc` and only ever call [`AlarmRelay::emit`].
///
/// One mutex guards config, socket and resolved handler address together, so
/// at most one encode+send is in flight process-wide and reconfiguration can
/// never race a send. The socket is bound lazily on the first emit after
/// (re)configuration; bind or resolution failure drops that send and the
/// next emit starts over. Once bound, the socket is reused indefinitely;
/// a send error does not discard it.
pub struct AlarmRelay {
    inner: Mutex<RelayInner>,
    liveness: Mutex<Option<Arc<LivenessState>>>,
    sent: AtomicU64,
    dropped: AtomicU64,
    disabled: AtomicU64,
    outage_logged: AtomicBool,
    logger: Logger,
}

impl AlarmRelay {
    #[must_use]
    pub fn new(config: RelayConfig, logger: Logger) -> Self {
        Self {
            inner: Mutex::new(RelayInner { config, link: None }),
            liveness: Mutex::new(None),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            disabled: AtomicU64::new(0),
            outage_logged: AtomicBool::new(false),
            logger,
        }
    }

    /// Stamp this liveness state on every emit: alive while sends succeed or
    /// relaying is disabled, degraded while sends drop.
    pub fn track_liveness(&self, state: Arc<LivenessState>) {
        *self.liveness.lock() = Some(state);
    }

    /// Replace the relay configuration. Invalidates the bound socket; the
    /// next emit rebinds and re-resolves. Never opens a socket itself. An
    /// outage in progress stays open until a send lands, so the restored
    /// line still pairs with the outage line after a reconfigure.
    pub fn configure(&self, config: RelayConfig) {
        let mut inner = self.inner.lock();
        inner.config = config;
        inner.link = None;
    }

    /// Host/port the relay is pointed at, if relaying is enabled.
    #[must_use]
    pub fn handler_endpoint(&self) -> Option<(String, u16)> {
        let inner = self.inner.lock();
        let host = inner.config.handler_host.clone()?;
        Some((host, inner.config.handler_port))
    }

    /// Encode and send one event as a single UDP datagram.
    ///
    /// Serialized process-wide; never blocks beyond one bind/resolve/send
    /// attempt and never returns an error. Failures degrade to `Dropped`
    /// and are logged once per outage.
    pub fn emit(&self, event: &AlarmEvent) -> EmitStatus {
        let mut inner = self.inner.lock();

        let Some(host) = inner.config.handler_host.clone() else {
            drop(inner);
            self.disabled.fetch_add(1, Ordering::Relaxed);
            self.stamp(LivenessState::ALIVE);
            return EmitStatus::Disabled;
        };

        let frame = wire::encode(event);
        let result = Self::try_send(&mut inner, &host, &frame);
        drop(inner);

        match result {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                if self.outage_logged.swap(false, Ordering::Relaxed) {
                    self.logger.stamped("alarm relay restored, sends flowing again");
                }
                self.stamp(LivenessState::ALIVE);
                EmitStatus::Sent
            }
            Err(err) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if !self.outage_logged.swap(true, Ordering::Relaxed) {
                    self.logger
                        .stamped(&format!("alarm relay outage [{}]: {err}", err.code()));
                }
                self.stamp(LivenessState::DEGRADED);
                EmitStatus::Dropped
            }
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            disabled: self.disabled.load(Ordering::Relaxed),
        }
    }

    /// Bind/resolve if needed, then send. A bind or resolve failure leaves
    /// `link` unset so the next emit starts from scratch; a send failure
    /// keeps the bound socket.
    fn try_send(inner: &mut RelayInner, host: &str, frame: &[u8]) -> Result<()> {
        if inner.link.is_none() {
            inner.link = Some(Self::open(&inner.config, host)?);
        }
        let (socket, handler) = inner
            .link
            .as_ref()
            .ok_or_else(|| SentryError::runtime("relay link missing after bind"))?;
        socket
            .send_to(frame, *handler)
            .map_err(|err| SentryError::io("relay send", err))?;
        Ok(())
    }

    fn open(config: &RelayConfig, host: &str) -> Result<(UdpSocket, SocketAddr)> {
        let socket = UdpSocket::bind(("0.0.0.0", config.local_bind_port))
            .map_err(|err| SentryError::io("relay bind", err))?;
        let handler = (host, config.handler_port)
            .to_socket_addrs()
            .map_err(|err| SentryError::Resolve {
                host: host.to_string(),
                details: err.to_string(),
            })?
            .next()
            .ok_or_else(|| SentryError::Resolve {
                host: host.to_string(),
                details: "resolved to no addresses".to_string(),
            })?;
        Ok((socket, handler))
    }

    fn stamp(&self, state: i64) {
        if let Some(liveness) = self.liveness.lock().as_ref() {
            liveness.mark(state);
            liveness.tick();
        }
    }
}
