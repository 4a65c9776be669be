//! Fleet Sentry — fleet-health watchdog mesh for distributed
//! data-acquisition networks.
//!
//! A fleet of acquisition nodes is only healthy while its processes answer
//! status probes, its network paths carry pings, and its stations hear a
//! periodic keepalive. This crate runs one watchdog thread per concern and
//! relays every detected failure as a fixed-format 140-byte UDP alarm to a
//! central handler.
//!
//! The crate is organized in three layers:
//!
//! - [`alarm`] holds the wire codec and the [`alarm::AlarmRelay`] that
//!   carries events to the handler.
//! - [`watchdog`] holds the periodic runner ([`watchdog::spawn`]) and the
//!   built-in strategies: TCP process probing, ping staleness detection,
//!   station keepalive broadcasting, and local liveness reporting.
//! - [`daemon`] assembles the mesh from a [`core::config::SentryConfig`]
//!   and owns the shutdown path.

pub mod alarm;
#[cfg(feature = "cli")]
pub mod cli_app;
pub mod core;
pub mod daemon;
pub mod logger;
pub mod watchdog;
