//! Terrascene headless driver.
//!
//! Runs the tile streaming engine without a renderer attached: `fly` drives
//! a scripted camera path and reports telemetry, `probe` prints tile math
//! for a point. Useful for exercising sources and tuning scheduler budgets.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "terrascene",
    version,
    about = "Headless driver for the Terrascene tile streaming engine"
)]
struct Cli {
    /// Default log filter (RUST_LOG takes precedence).
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fly a scripted camera path and report engine telemetry.
    Fly(commands::fly::FlyArgs),
    /// Print tile math for a geographic point.
    Probe(commands::probe::ProbeArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    terrascene::app::init_logging(&cli.log);

    let result = match cli.command {
        Commands::Fly(args) => commands::fly::run(args),
        Commands::Probe(args) => commands::probe::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
