//! SQLite station source and keepalive broadcaster integration: real
//! database fixtures, protocol filtering, reconnect behavior, and one full
//! broadcast pass over the wire.

#![cfg(feature = "sqlite")]

use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use fleet_sentry::alarm::{wire, EventOrigin};
use fleet_sentry::logger::MemorySink;
use fleet_sentry::watchdog::keepalive::{KeepaliveBroadcaster, KeepaliveTimings};
use fleet_sentry::watchdog::{cancel_pair, SqliteStationSource, StationSource, Watchdog};

fn station_db(dir: &TempDir, rows: &[(&str, &str, &str)]) -> std::path::PathBuf {
    let path = dir.path().join("stations.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "CREATE TABLE stations (name TEXT NOT NULL, ip TEXT NOT NULL, proto TEXT NOT NULL)",
        [],
    )
    .unwrap();
    for (name, ip, proto) in rows {
        conn.execute(
            "INSERT INTO stations (name, ip, proto) VALUES (?1, ?2, ?3)",
            [name, ip, proto],
        )
        .unwrap();
    }
    path
}

fn drain(source: &mut SqliteStationSource) -> Vec<(String, String)> {
    let mut cursor = source.open().unwrap();
    let mut rows = Vec::new();
    while let Some(station) = cursor.next_station().unwrap() {
        rows.push((station.name, station.ip));
    }
    rows
}

#[test]
fn source_filters_by_protocol_and_orders_by_name() {
    let dir = TempDir::new().unwrap();
    let path = station_db(
        &dir,
        &[
            ("st-west", "10.0.0.3", "udp"),
            ("st-east", "10.0.0.1", "udp"),
            ("st-east", "10.0.0.1", "tcp"),
            ("st-north", "10.0.0.2", "serial"),
        ],
    );

    let mut source = SqliteStationSource::new(&path, "udp");
    assert_eq!(
        drain(&mut source),
        vec![
            ("st-east".to_string(), "10.0.0.1".to_string()),
            ("st-west".to_string(), "10.0.0.3".to_string()),
        ]
    );

    let mut serial = SqliteStationSource::new(&path, "serial");
    assert_eq!(
        drain(&mut serial),
        vec![("st-north".to_string(), "10.0.0.2".to_string())]
    );
}

#[test]
fn empty_protocol_match_is_a_clean_empty_pass() {
    let dir = TempDir::new().unwrap();
    let path = station_db(&dir, &[("st-east", "10.0.0.1", "tcp")]);

    let mut source = SqliteStationSource::new(&path, "udp");
    assert!(drain(&mut source).is_empty());
}

#[test]
fn missing_table_is_a_data_source_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.db");
    rusqlite::Connection::open(&path).unwrap();

    let mut source = SqliteStationSource::new(&path, "udp");
    let err = source.open().err().unwrap();
    assert_eq!(err.code(), "FSY-2201");
}

#[test]
fn source_recovers_once_the_table_appears() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("late.db");
    rusqlite::Connection::open(&path).unwrap();

    let mut source = SqliteStationSource::new(&path, "udp");
    assert!(source.open().is_err());

    // Table shows up between passes, as when a provisioning job lands.
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "CREATE TABLE stations (name TEXT NOT NULL, ip TEXT NOT NULL, proto TEXT NOT NULL)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO stations (name, ip, proto) VALUES ('st-east', '10.0.0.1', 'udp')",
        [],
    )
    .unwrap();

    assert_eq!(
        drain(&mut source),
        vec![("st-east".to_string(), "10.0.0.1".to_string())]
    );
}

#[test]
fn invalidate_forces_a_fresh_connection() {
    let dir = TempDir::new().unwrap();
    let path = station_db(&dir, &[("st-east", "10.0.0.1", "udp")]);

    let mut source = SqliteStationSource::new(&path, "udp");
    assert_eq!(drain(&mut source).len(), 1);
    source.invalidate();
    assert_eq!(drain(&mut source).len(), 1);
}

#[test]
fn one_broadcast_pass_reaches_every_listed_station() {
    let receiver = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
    let port = receiver.local_addr().unwrap().port();

    let dir = TempDir::new().unwrap();
    let path = station_db(
        &dir,
        &[
            ("st-east", "127.0.0.1", "udp"),
            ("st-west", "127.0.0.1", "udp"),
            ("st-wired", "127.0.0.1", "tcp"),
        ],
    );

    let sink = Arc::new(MemorySink::new());
    let origin = EventOrigin::new("lab-1", "acqd");
    let mut broadcaster = KeepaliveBroadcaster::new(
        &origin,
        Box::new(SqliteStationSource::new(&path, "udp")),
        port,
        KeepaliveTimings {
            interval: Duration::from_millis(50),
            backoff: Duration::from_millis(10),
        },
        sink.clone(),
    );

    let (_canceller, token) = cancel_pair();
    broadcaster.run_cycle(&token);

    receiver
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    let mut buf = [0u8; 512];
    for _ in 0..2 {
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let event = wire::decode(&buf[..len]).unwrap();
        assert_eq!(event.source(), "keepalive");
        assert_eq!(event.code(), "KeepAlive");
        assert_eq!(event.node(), "lab-1");
        assert_eq!(event.payload(), "fleet keepalive");
    }
    assert!(receiver.recv_from(&mut buf).is_err(), "tcp row must not be broadcast");
    assert!(sink.contains("keepalive pass complete, 2 stations"));
}
