//! Line-oriented event logging: plain and timestamp-prefixed text sinks
//! with graceful degradation.
//!
//! Watchdogs and the alarm relay report diagnostics exclusively through
//! [`LineSink`]; nothing in the monitoring subsystem writes to a terminal
//! or file directly. Sinks must tolerate being shared across every
//! watchdog thread for the process lifetime.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::core::errors::{Result, SentryError};

/// Shared handle to the process-wide logging collaborator.
pub type Logger = Arc<dyn LineSink>;

/// Logging collaborator contract: accepts plain and timestamp-prefixed
/// text lines.
pub trait LineSink: Send + Sync {
    /// Write one line verbatim.
    fn plain(&self, line: &str);

    /// Write one line prefixed with a UTC timestamp.
    fn stamped(&self, line: &str);
}

/// Timestamp prefix shared by every stamped sink.
fn stamp(line: &str) -> String {
    format!("{} {line}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"))
}

/// Stderr sink, the daemon default when no log file is configured.
#[derive(Debug, Default)]
pub struct StderrSink;

impl LineSink for StderrSink {
    fn plain(&self, line: &str) {
        eprintln!("{line}");
    }

    fn stamped(&self, line: &str) {
        eprintln!("{}", stamp(line));
    }
}

/// Append-only file sink. A line that cannot be written falls back to
/// stderr; the file is retried on the next line.
#[derive(Debug)]
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    /// Open (or create) the log file in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SentryError::io("log file", source))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn write_line(&self, line: &str) {
        let mut file = self.file.lock();
        if writeln!(file, "{line}").is_err() {
            eprintln!("{line}");
        }
    }
}

impl LineSink for FileSink {
    fn plain(&self, line: &str) {
        self.write_line(line);
    }

    fn stamped(&self, line: &str) {
        self.write_line(&stamp(line));
    }
}

/// Forwards every line to each wrapped sink.
pub struct FanoutSink {
    sinks: Vec<Logger>,
}

impl FanoutSink {
    #[must_use]
    pub fn new(sinks: Vec<Logger>) -> Self {
        Self { sinks }
    }
}

impl LineSink for FanoutSink {
    fn plain(&self, line: &str) {
        for sink in &self.sinks {
            sink.plain(line);
        }
    }

    fn stamped(&self, line: &str) {
        for sink in &self.sinks {
            sink.stamped(line);
        }
    }
}

/// In-memory capture sink used by tests and the config checker.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every captured line, in write order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any captured line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }

    /// Number of captured lines containing `needle`.
    #[must_use]
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl LineSink for MemorySink {
    fn plain(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }

    fn stamped(&self, line: &str) {
        self.lines.lock().push(stamp(line));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{FanoutSink, FileSink, LineSink, Logger, MemorySink, stamp};

    #[test]
    fn stamped_lines_carry_a_timestamp_prefix() {
        let stamped = stamp("portmon: probe failed");
        // "YYYY-MM-DD HH:MM:SS.mmm " is 24 characters wide.
        assert!(stamped.len() > "portmon: probe failed".len() + 23);
        assert!(stamped.ends_with("portmon: probe failed"));
        assert!(stamped.starts_with("20"));
    }

    #[test]
    fn memory_sink_captures_in_order() {
        let sink = MemorySink::new();
        sink.plain("first");
        sink.stamped("second");
        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "first");
        assert!(lines[1].ends_with("second"));
        assert!(sink.contains("second"));
        assert_eq!(sink.count_containing("first"), 1);
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sentry.log");
        let sink = FileSink::open(&path).expect("open log file");
        sink.plain("alpha");
        sink.stamped("beta");

        let content = std::fs::read_to_string(&path).expect("read log file");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "alpha");
        assert!(lines[1].ends_with("beta"));
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Arc::new(MemorySink::new());
        let second = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![
            Arc::clone(&first) as Logger,
            Arc::clone(&second) as Logger,
        ]);
        fanout.plain("broadcast");
        assert!(first.contains("broadcast"));
        assert!(second.contains("broadcast"));
    }
}
