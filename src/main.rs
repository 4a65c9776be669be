//! `fsentry` binary entry point.

use clap::Parser;

use fleet_sentry::cli_app::{run, Cli};

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("fsentry: {err}");
        std::process::exit(1);
    }
}
