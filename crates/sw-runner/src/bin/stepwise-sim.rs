//! Simulation runner for Stepwise generation strategies
//!
//! # Usage
//!
//! ```bash
//! stepwise-sim --config run.json --max-rounds 50 --log-format json
//! ```
//!
//! Logging honours `RUST_LOG` (default `info`). The run summary is printed to
//! stdout as JSON.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sw_runner::{RunnerConfig, Simulation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "stepwise-sim")]
#[command(about = "Run a generation strategy against a synthetic objective")]
struct Args {
    /// Path to the JSON run configuration
    #[arg(long)]
    config: PathBuf,

    /// Override the configured number of rounds
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Override the configured number of candidates per round
    #[arg(long)]
    batch_size: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    // Logs go to stderr so stdout carries only the summary.
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let mut config = RunnerConfig::from_path(&args.config).with_context(|| {
        format!("Failed to load run configuration from {}", args.config.display())
    })?;
    if let Some(max_rounds) = args.max_rounds {
        config.simulation.max_rounds = max_rounds;
    }
    if let Some(batch_size) = args.batch_size {
        config.simulation.batch_size = batch_size;
    }

    info!(
        experiment = %config.experiment.name,
        strategy = %config.strategy.name,
        "Starting Stepwise simulation"
    );

    let mut simulation =
        Simulation::from_config(&config).context("Failed to set up the simulation")?;
    let summary = simulation.run().context("Simulation failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?
    );
    Ok(())
}
