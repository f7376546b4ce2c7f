// ABOUTME: CLI config and stats-schema commands
//
// config: print the effective configuration (files + env overrides) as TOML
// stats-schema: print example payloads of the stats snapshot and pool events

use anyhow::{Context, Result};
use serde::Serialize;

use super::OutputFormat;
use agent_pool::config::AppConfig;
use agent_pool::session_pool::{PoolEvent, PoolStats, SessionId};

pub fn config(config: &AppConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(config).context("Failed to serialize config")?
            );
        }
        OutputFormat::Text => print!("{}", config.to_toml()?),
    }
    Ok(())
}

/// Example payloads the observability layer consumes
#[derive(Debug, Serialize)]
pub struct StatsSchema {
    pub stats: PoolStats,
    pub events: Vec<PoolEvent>,
}

pub fn example_schema(config: &AppConfig) -> StatsSchema {
    let pool = &config.pool;
    let stats = PoolStats {
        total: pool.max_size,
        idle: pool.keep_idle_size,
        active: pool.max_size.saturating_sub(pool.keep_idle_size),
        reserved: 0,
        max_size: pool.max_size,
        keep_idle_size: pool.keep_idle_size,
        initial_size: pool.initial_size,
        acquisitions_total: 42,
        on_demand_creations_total: 3,
        exhausted_total: 1,
        creation_failures_total: 0,
        reclaimed_total: 2,
        evicted_total: 1,
        recent_acquire_latencies_ms: vec![0.04, 0.05, 5012.3],
        captured_at: chrono::Utc::now(),
    };

    let events = vec![
        PoolEvent::CreatingAgent {
            estimated_seconds: pool.estimated_creation_secs,
        },
        PoolEvent::Exhausted {
            pool_size: pool.max_size,
            in_use: pool.max_size,
        },
        PoolEvent::SessionEvicted {
            session_id: SessionId::new(),
        },
        PoolEvent::SessionReclaimed {
            session_id: SessionId::new(),
            idle_secs: pool.idle_timeout.as_secs() + 1,
        },
    ];

    StatsSchema { stats, events }
}

pub fn stats_schema(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let schema = example_schema(config);

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?
            );
        }
        OutputFormat::Text => {
            println!("PoolStats:");
            println!(
                "{}",
                serde_json::to_string_pretty(&schema.stats).context("Failed to serialize stats")?
            );
            println!();
            println!("Events:");
            for event in &schema.events {
                println!(
                    "  {}",
                    serde_json::to_string(event).context("Failed to serialize event")?
                );
            }
        }
    }
    Ok(())
}
