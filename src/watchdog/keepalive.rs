//! Keepalive broadcast: read the station list from a data source, unicast
//! one fixed keepalive datagram to every station.

use std::net::{ToSocketAddrs, UdpSocket};
#[cfg(feature = "sqlite")]
use std::path::PathBuf;
use std::time::Duration;

use crate::alarm::event::EventOrigin;
use crate::alarm::wire;
use crate::core::config::KeepaliveSettings;
use crate::core::errors::{Result, SentryError};
use crate::logger::Logger;
use crate::watchdog::lifecycle::{identity_jitter, CancelToken};
use crate::watchdog::Watchdog;

const KEEPALIVE_SOURCE: &str = "keepalive";
const KEEPALIVE_CODE: &str = "KeepAlive";

/// One `(station, ip)` row from the target source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub name: String,
    pub ip: String,
}

/// Ordered pass over the current station list.
pub trait StationCursor {
    /// Next station, `None` at the end of the list, `Err` on a data-source
    /// fault.
    fn next_station(&mut self) -> Result<Option<Station>>;
}

/// Source of station lists. The broadcaster opens one cursor per pass and
/// never holds one across cycles.
pub trait StationSource: Send {
    fn open(&mut self) -> Result<Box<dyn StationCursor>>;

    /// Drop any cached connection so the next `open` starts fresh.
    fn invalidate(&mut self) {}
}

/// Cursor over an already-materialized list; never faults.
pub struct ListCursor {
    stations: std::vec::IntoIter<Station>,
}

impl ListCursor {
    #[must_use]
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations: stations.into_iter(),
        }
    }
}

impl StationCursor for ListCursor {
    fn next_station(&mut self) -> Result<Option<Station>> {
        Ok(self.stations.next())
    }
}

/// Station list in a SQLite `stations` table, filtered by protocol.
///
/// The connection is opened lazily and cached across passes; any error drops
/// it so the next open reconnects. Rows borrow their statement in rusqlite,
/// so each pass is materialized at `open`; a row fault therefore surfaces
/// at acquisition, on the same backoff path as a failed open.
#[cfg(feature = "sqlite")]
pub struct SqliteStationSource {
    path: PathBuf,
    protocol: String,
    conn: Option<rusqlite::Connection>,
}

#[cfg(feature = "sqlite")]
impl SqliteStationSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, protocol: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            protocol: protocol.into(),
            conn: None,
        }
    }

    fn rows(&mut self) -> Result<Vec<Station>> {
        if self.conn.is_none() {
            let conn = rusqlite::Connection::open(&self.path).map_err(|err| {
                SentryError::DataSource {
                    context: "station db open",
                    details: err.to_string(),
                }
            })?;
            self.conn = Some(conn);
        }
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| SentryError::runtime("station db connection missing"))?;
        let mut statement =
            conn.prepare("SELECT name, ip FROM stations WHERE proto = ?1 ORDER BY name")?;
        let mapped = statement.query_map([self.protocol.as_str()], |row| {
            Ok(Station {
                name: row.get(0)?,
                ip: row.get(1)?,
            })
        })?;
        let mut stations = Vec::new();
        for station in mapped {
            stations.push(station?);
        }
        Ok(stations)
    }
}

#[cfg(feature = "sqlite")]
impl StationSource for SqliteStationSource {
    fn open(&mut self) -> Result<Box<dyn StationCursor>> {
        match self.rows() {
            Ok(stations) => Ok(Box::new(ListCursor::new(stations))),
            Err(err) => {
                self.conn = None;
                Err(err)
            }
        }
    }

    fn invalidate(&mut self) {
        self.conn = None;
    }
}

/// Broadcast timings; defaults are the production constants.
#[derive(Debug, Clone, Copy)]
pub struct KeepaliveTimings {
    /// Pause between complete passes.
    pub interval: Duration,
    /// Pause before retrying a failed source.
    pub backoff: Duration,
}

impl Default for KeepaliveTimings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            backoff: Duration::from_secs(30),
        }
    }
}

impl From<&KeepaliveSettings> for KeepaliveTimings {
    fn from(settings: &KeepaliveSettings) -> Self {
        Self {
            interval: settings.interval(),
            backoff: settings.backoff(),
        }
    }
}

/// Per-cycle station-list broadcast.
///
/// One cycle retries source acquisition with backoff until a complete pass
/// succeeds (or the loop is cancelled); a mid-pass source fault discards the
/// cursor, forces reconnection and restarts the backoff path. Source
/// outages never become alarms; the stations are not the thing failing.
/// The broadcaster owns its own ephemeral UDP socket and never touches the
/// relay.
pub struct KeepaliveBroadcaster {
    /// Built once; every station receives the same bytes.
    frame: [u8; wire::FRAME_LEN],
    source: Box<dyn StationSource>,
    port: u16,
    timings: KeepaliveTimings,
    socket: Option<UdpSocket>,
    logger: Logger,
}

impl KeepaliveBroadcaster {
    #[must_use]
    pub fn new(
        origin: &EventOrigin,
        source: Box<dyn StationSource>,
        port: u16,
        timings: KeepaliveTimings,
        logger: Logger,
    ) -> Self {
        let event = origin.event(KEEPALIVE_SOURCE, KEEPALIVE_CODE, "fleet keepalive");
        Self {
            frame: wire::encode(&event),
            source,
            port,
            timings,
            socket: None,
            logger,
        }
    }

    fn socket(&mut self) -> Result<&UdpSocket> {
        if self.socket.is_none() {
            let socket = UdpSocket::bind(("0.0.0.0", 0))
                .map_err(|err| SentryError::io("keepalive bind", err))?;
            self.socket = Some(socket);
        }
        self.socket
            .as_ref()
            .ok_or_else(|| SentryError::runtime("keepalive socket missing"))
    }

    fn dispatch(&mut self, station: &Station) -> Result<()> {
        let address = (station.ip.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| SentryError::Resolve {
                host: station.ip.clone(),
                details: err.to_string(),
            })?
            .next()
            .ok_or_else(|| SentryError::Resolve {
                host: station.ip.clone(),
                details: "resolved to no addresses".to_string(),
            })?;
        let frame = self.frame;
        self.socket()?
            .send_to(&frame, address)
            .map_err(|err| SentryError::io("keepalive send", err))?;
        Ok(())
    }

    /// One full pass. A per-station resolve/send failure is logged and the
    /// pass continues; only a cursor fault aborts it.
    fn broadcast(&mut self, cursor: &mut dyn StationCursor) -> Result<usize> {
        let mut delivered = 0usize;
        while let Some(station) = cursor.next_station()? {
            match self.dispatch(&station) {
                Ok(()) => delivered += 1,
                Err(err) => self.logger.stamped(&format!(
                    "keepalive to {} ({}) failed [{}]: {err}",
                    station.name,
                    station.ip,
                    err.code()
                )),
            }
        }
        Ok(delivered)
    }
}

impl Watchdog for KeepaliveBroadcaster {
    fn name(&self) -> String {
        KEEPALIVE_SOURCE.to_string()
    }

    fn startup_delay(&self) -> Duration {
        identity_jitter(KEEPALIVE_SOURCE, self.timings.interval)
    }

    fn period(&self) -> Duration {
        self.timings.interval
    }

    fn run_cycle(&mut self, cancel: &CancelToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let mut cursor = match self.source.open() {
                Ok(cursor) => cursor,
                Err(err) => {
                    self.logger.stamped(&format!(
                        "keepalive station source unavailable [{}]: {err}",
                        err.code()
                    ));
                    if cancel.wait(self.timings.backoff) {
                        return;
                    }
                    continue;
                }
            };
            match self.broadcast(cursor.as_mut()) {
                Ok(delivered) => {
                    self.logger
                        .stamped(&format!("keepalive pass complete, {delivered} stations"));
                    return;
                }
                Err(err) => {
                    self.source.invalidate();
                    self.logger.stamped(&format!(
                        "keepalive station source failed mid-pass [{}]: {err}",
                        err.code()
                    ));
                    if cancel.wait(self.timings.backoff) {
                        return;
                    }
                }
            }
        }
    }
}
