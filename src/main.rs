// ABOUTME: Main entry point for agent-pool
//
// Binary: agent-pool
// Usage: agent-pool [--format text|json] [--config PATH] COMMAND
// - simulate: run concurrent workers against simulated agent sessions
// - config: print the effective configuration
// - stats-schema: print example stats and event payloads

#![allow(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use agent_pool::config::AppConfig;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = setup_logging(cli.log_stderr)?;
    setup_panic_handler();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = ?log_file,
        "Starting agent-pool"
    );

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let result = match cli.command {
        Commands::Simulate(args) => cli::simulate::execute(args, config, cli.format).await,
        Commands::Config => cli::show::config(&config, cli.format),
        Commands::StatsSchema => cli::show::stats_schema(&config, cli.format),
    };

    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Command failed");
    }
    result
}

/// Install the tracing subscriber.
///
/// Logs go to a JSON Lines file under `~/.agent-pool/logs` unless
/// `to_stderr` is set. Returns the log file path when one is used.
fn setup_logging(to_stderr: bool) -> Result<Option<PathBuf>> {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "agent_pool=info".into());

    if to_stderr {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
        return Ok(None);
    }

    // Create log directory if it doesn't exist
    let log_dir = dirs::home_dir()
        .map(|home| home.join(".agent-pool").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".agent-pool/logs"));

    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    // Create JSONL log file with timestamp
    let log_file = log_dir.join(format!(
        "agent-pool-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("Failed to create log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()             // Output in JSON Lines format
                .with_target(true)  // Include target module in JSON
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false),
        )
        .with(filter)
        .init();

    Ok(Some(log_file))
}

fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!("Application panicked: {}", panic_info);
        default_hook(panic_info);
    }));
}
