//! # carla-scenario
//!
//! Command-line entry point: scenario loading, logging and metrics setup,
//! command dispatch.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_batch, run_info, run_record, run_replay, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "carla-scenario starting"
    );

    let result = match &cli.command {
        Commands::Record(args) => run_record(args).await,
        Commands::Replay(args) => run_replay(args).await,
        Commands::Batch(args) => run_batch(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %format!("{e:#}"), "Command failed");
    }

    result
}

/// Tracing from `-v` / `-q` / `RUST_LOG`, Prometheus when `--metrics-port` is set
fn init_logging(cli: &Cli) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: cli.metrics_port,
        default_log_level: default_log_level.to_string(),
    })
}
