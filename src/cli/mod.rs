// ABOUTME: CLI argument parsing and command routing for agent-pool
//
// Provides command-line interface for:
// - Exercising a pool against simulated agent sessions (simulate)
// - Printing the effective configuration (config)
// - Printing the stats and event JSON contract (stats-schema)

pub mod show;
pub mod simulate;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Dynamic pool of pre-warmed AI agent sessions
#[derive(Parser)]
#[command(name = "agent-pool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file to use instead of the default locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr in human-readable form instead of the JSONL log file
    #[arg(long, global = true)]
    pub log_stderr: bool,
}

/// Output format for commands
#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run concurrent workers against a pool of simulated sessions
    Simulate(SimulateArgs),

    /// Print the effective configuration as TOML
    Config,

    /// Print example stats and event payloads
    StatsSchema,
}

/// Arguments for the simulate command
#[derive(clap::Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of concurrent workers
    #[arg(long, short, default_value = "8")]
    pub workers: usize,

    /// Acquire/release cycles per worker
    #[arg(long, short, default_value = "10")]
    pub iterations: usize,

    /// How long a worker holds a session, in milliseconds
    #[arg(long, default_value = "200")]
    pub hold_ms: u64,

    /// Simulated connect latency, in milliseconds
    #[arg(long, default_value = "500")]
    pub connect_ms: u64,

    /// Fail every Nth connect (0 never fails)
    #[arg(long, default_value = "0")]
    pub fail_every: u64,

    /// Sessions report unhealthy after this many uses (0 never)
    #[arg(long, default_value = "0")]
    pub max_uses: u64,

    /// Override the configured hard cap
    #[arg(long)]
    pub max_size: Option<usize>,

    /// Override the configured idle floor
    #[arg(long)]
    pub keep_idle: Option<usize>,

    /// Override the configured startup size
    #[arg(long)]
    pub initial: Option<usize>,
}
