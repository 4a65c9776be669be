//! End-to-end smoke tests for the `fsentry` binary surface.

#![cfg(feature = "cli")]

use std::net::UdpSocket;
use std::process::{Command, Output};
use std::time::Duration;

use tempfile::TempDir;

use fleet_sentry::alarm::wire;

fn fsentry(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fsentry"))
        .args(args)
        .output()
        .expect("fsentry binary runs")
}

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("fsentry.toml");
    std::fs::write(&path, body).unwrap();
    path.display().to_string()
}

#[test]
fn help_prints_usage() {
    let output = fsentry(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage: fsentry"));
    assert!(stdout.contains("daemon"));
    assert!(stdout.contains("check"));
    assert!(stdout.contains("send"));
}

#[test]
fn version_prints_the_crate_version() {
    let output = fsentry(&["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("fsentry"));
}

#[test]
fn check_reports_the_mesh_as_json() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"
node = "dc1-n7"

[relay]
handler_host = "alarms.lab"

[[monitor]]
spec = "da1.lab:9901:acq:ops:alarm"

[ping]
targets = ["gw.lab"]
"#,
    );

    let output = fsentry(&["check", "--config", &config, "--json"]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["node"], "dc1-n7");
    assert_eq!(report["relay_endpoint"], "alarms.lab:7964");
    assert_eq!(report["monitors"][0], "da1.lab:9901:acq");
    assert_eq!(report["ping_targets"][0], "gw.lab");
    let watchdogs = report["watchdogs"].as_array().unwrap();
    assert!(watchdogs.contains(&serde_json::json!("pingmon")));
    assert!(watchdogs.contains(&serde_json::json!("liveness")));
}

#[test]
fn check_rejects_a_bad_monitor_spec() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"
[[monitor]]
spec = "not-a-spec"
"#,
    );

    let output = fsentry(&["check", "--config", &config]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("FSY-1004"));
}

#[test]
fn missing_config_file_is_a_clean_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml").display().to_string();

    let output = fsentry(&["check", "--config", &path]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("FSY-1002"));
}

#[test]
fn send_delivers_one_decodable_frame() {
    let receiver = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
    let port = receiver.local_addr().unwrap().port();

    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &format!(
            r#"
node = "dc1-n8"

[relay]
handler_host = "127.0.0.1"
handler_port = {port}
"#
        ),
    );

    let output = fsentry(&["send", "opstest", "OpsTest", "hand-fired", "--config", &config]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("sent"));

    receiver
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut buf = [0u8; 512];
    let (len, _) = receiver.recv_from(&mut buf).unwrap();
    let event = wire::decode(&buf[..len]).unwrap();
    assert_eq!(event.node(), "dc1-n8");
    assert_eq!(event.process(), "fsentry");
    assert_eq!(event.source(), "opstest");
    assert_eq!(event.code(), "OpsTest");
    assert_eq!(event.payload(), "hand-fired");
}

#[test]
fn completions_emit_a_bash_script() {
    let output = fsentry(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("fsentry"));
}
