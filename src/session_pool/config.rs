// ABOUTME: Configuration for the agent session pool
//
// Defines PoolConfig with all tunable parameters for the pool:
// - Sizing: initial warm-up, idle floor, hard cap
// - Idle reclamation and health probe cadence
// - Growth backstop interval and creation estimate shown to callers
// - Stats sample window and shutdown grace period

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Reasons a pool configuration is rejected at construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A pool that can never hold a session
    #[error("max_size must be at least 1")]
    ZeroCapacity,

    /// Startup always creates the first session synchronously
    #[error("initial_size must be at least 1")]
    ZeroInitialSize,

    /// Size parameter larger than the hard cap
    #[error("{field} ({value}) exceeds max_size ({max_size})")]
    ExceedsMax {
        /// Offending field name
        field: &'static str,
        /// Configured value
        value: usize,
        /// Configured cap
        max_size: usize,
    },

    /// Intervals drive tokio timers and must be non-zero
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Configuration for the agent session pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    // === Sizing ===
    /// Sessions created at startup (the first synchronously)
    pub initial_size: usize,

    /// Idle floor the growth controller maintains
    pub keep_idle_size: usize,

    /// Hard cap on idle + active + in-flight creations
    pub max_size: usize,

    // === Maintenance ===
    /// Idle sessions unused for longer than this are eligible for reclamation
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,

    /// Interval between idle reaper and health checker passes
    #[serde(with = "duration_secs")]
    pub health_check_interval: Duration,

    /// Backstop interval for deficit checks when no acquire/release happens
    #[serde(with = "duration_secs")]
    pub growth_check_interval: Duration,

    // === Caller Experience ===
    /// Estimate passed to `on_creating` when acquire must create on demand
    pub estimated_creation_secs: u64,

    /// Number of recent acquisition latencies kept for stats
    pub latency_sample_capacity: usize,

    /// How long shutdown waits for each background task to stop
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 2,
            keep_idle_size: 2,
            max_size: 5,

            idle_timeout: Duration::from_secs(300), // 5 minutes
            health_check_interval: Duration::from_secs(30),
            growth_check_interval: Duration::from_secs(10),

            estimated_creation_secs: 5,
            latency_sample_capacity: 100,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    /// Check sizing and interval constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.initial_size == 0 {
            return Err(ConfigError::ZeroInitialSize);
        }
        for (field, value) in [
            ("initial_size", self.initial_size),
            ("keep_idle_size", self.keep_idle_size),
        ] {
            if value > self.max_size {
                return Err(ConfigError::ExceedsMax {
                    field,
                    value,
                    max_size: self.max_size,
                });
            }
        }
        for (field, interval) in [
            ("health_check_interval", self.health_check_interval),
            ("growth_check_interval", self.growth_check_interval),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::ZeroInterval(field));
            }
        }
        Ok(())
    }
}

/// Serde helper for Duration as seconds (u64)
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
