//! Binary entrypoint: parses flags, wires telemetry, dispatches to a
//! subcommand (spec.md §6).

mod commands;

use btfhub_config::{Cli, Command};
use clap::Parser;

/// Exit code for runtime errors; clap itself exits with 2 on usage errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    btfhub_telemetry::init(cli.flags.debug);

    let result = match cli.command {
        None => commands::run(&cli.flags).await,
        Some(Command::Check) => commands::check(&cli.flags).await,
        Some(Command::Upload) => commands::upload(&cli.flags).await,
        Some(Command::CatalogUpdate) => commands::catalog_update(&cli.flags).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}
