//! Top-level CLI definition and dispatch.
//!
//! `fsentry daemon` runs the watchdog mesh in the foreground; `check` and
//! `send` are operator tools for validating a configuration and for pushing
//! a single hand-built alarm through the relay path.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use serde::Serialize;

use crate::alarm::{AlarmRelay, EmitStatus, EventOrigin};
use crate::core::config::SentryConfig;
use crate::core::errors::{Result, SentryError};
use crate::daemon;
use crate::logger::StderrSink;

/// Fleet Sentry — watchdog mesh for distributed data-acquisition fleets.
#[derive(Parser)]
#[command(name = "fsentry", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "/etc/fsentry.toml")]
    pub config: PathBuf,
    /// Emit machine-readable JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Run the watchdog mesh in the foreground (used by systemd).
    Daemon,
    /// Validate the configuration and show what would be monitored.
    Check,
    /// Emit a single alarm datagram through the configured relay.
    Send {
        /// Alarm source identifier (truncated to 12 bytes on the wire).
        source: String,
        /// Alarm code (truncated to 12 bytes on the wire).
        code: String,
        /// Alarm payload text (truncated to 80 bytes on the wire).
        #[arg(default_value = "manual test alarm")]
        payload: String,
    },
    /// Generate shell completions to stdout.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

// ---------------------------------------------------------------------------
// Config check
// ---------------------------------------------------------------------------

/// Structured report from a `check` run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// Node identity stamped into outgoing alarms.
    pub node: String,
    /// Process identity stamped into outgoing alarms.
    pub process: String,
    /// Alarm handler endpoint, if relaying is enabled.
    pub relay_endpoint: Option<String>,
    /// Monitor target keys, one per TCP health probe.
    pub monitors: Vec<String>,
    /// Hosts watched for ping staleness.
    pub ping_targets: Vec<String>,
    /// Station database path, if keepalive broadcasting is enabled.
    pub keepalive_db: Option<PathBuf>,
    /// Watchdog threads the daemon would start.
    pub watchdogs: Vec<String>,
}

impl CheckReport {
    /// Validate `config` and summarize the mesh it describes.
    pub fn from_config(config: &SentryConfig) -> Result<Self> {
        config.validate()?;
        let targets = config.monitor_targets()?;
        let monitors: Vec<String> = targets.iter().map(|target| target.key()).collect();

        let mut watchdogs: Vec<String> =
            monitors.iter().map(|key| format!("probe-{key}")).collect();
        if !config.ping.targets.is_empty() {
            watchdogs.push("pingmon".to_string());
        }
        if config.keepalive.is_some() {
            watchdogs.push("keepalive".to_string());
        }
        watchdogs.push("liveness".to_string());

        Ok(Self {
            node: config.node.clone(),
            process: config.process.clone(),
            relay_endpoint: config
                .relay
                .handler_host
                .as_ref()
                .map(|host| format!("{host}:{}", config.relay.handler_port)),
            monitors,
            ping_targets: config.ping.targets.clone(),
            keepalive_db: config.keepalive.as_ref().map(|ka| ka.db_path.clone()),
            watchdogs,
        })
    }
}

fn print_check(report: &CheckReport) {
    println!("node       {}", report.node);
    println!("process    {}", report.process);
    match &report.relay_endpoint {
        Some(endpoint) => println!("relay      {endpoint}"),
        None => println!("relay      {}", "disabled (no handler_host)".yellow()),
    }
    for key in &report.monitors {
        println!("monitor    {key}");
    }
    for host in &report.ping_targets {
        println!("ping       {host}");
    }
    if let Some(path) = &report.keepalive_db {
        println!("keepalive  {}", path.display());
    }
    println!("watchdogs  {}", report.watchdogs.join(", "));
    println!("{}", "configuration ok".green());
}

// ---------------------------------------------------------------------------
// One-shot send
// ---------------------------------------------------------------------------

/// Structured report from a one-shot `send`.
#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    /// Dispatch outcome for the single datagram.
    pub status: String,
    /// Alarm handler endpoint, if relaying is enabled.
    pub endpoint: Option<String>,
}

fn print_send(report: &SendReport, status: EmitStatus) {
    match status {
        EmitStatus::Sent => {
            let endpoint = report.endpoint.as_deref().unwrap_or("handler");
            println!("alarm {} to {endpoint}", "sent".green());
        }
        EmitStatus::Disabled => println!(
            "relay {}: no handler_host configured, nothing sent",
            "disabled".yellow()
        ),
        EmitStatus::Dropped => {
            println!("alarm {}: see stderr for the send error", "dropped".red());
        }
    }
}

fn send_once(
    config: &SentryConfig,
    source: &str,
    code: &str,
    payload: &str,
) -> (SendReport, EmitStatus) {
    let relay = AlarmRelay::new(config.relay.clone(), Arc::new(StderrSink));
    let origin = EventOrigin::new(config.node.clone(), config.process.clone());
    let status = relay.emit(&origin.event(source, code, payload));
    let report = SendReport {
        status: format!("{status:?}"),
        endpoint: relay
            .handler_endpoint()
            .map(|(host, port)| format!("{host}:{port}")),
    };
    (report, status)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Dispatch CLI commands.
///
/// # Errors
/// Returns an error if the subcommand fails.
pub fn run(cli: &Cli) -> std::result::Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Daemon => {
            let config = SentryConfig::load(&cli.config)?;
            let logger = daemon::build_logger(&config.log)?;
            daemon::run(&config, logger)?;
        }
        Command::Check => {
            let config = SentryConfig::load(&cli.config)?;
            let report = CheckReport::from_config(&config)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_check(&report);
            }
        }
        Command::Send {
            source,
            code,
            payload,
        } => {
            let config = SentryConfig::load(&cli.config)?;
            config.validate()?;
            let (report, status) = send_once(&config, source, code, payload);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_send(&report, status);
            }
            if status == EmitStatus::Dropped {
                return Err(Box::new(SentryError::runtime("alarm datagram dropped")));
            }
        }
        Command::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "fsentry", &mut std::io::stdout());
        }
    }
    Ok(())
}
