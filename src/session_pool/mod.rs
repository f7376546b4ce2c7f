// ABOUTME: Dynamic pool of pre-warmed agent sessions with fail-fast acquisition
// ABOUTME: Grows proactively, reclaims idle excess, evicts unhealthy sessions

//! Agent session pool.
//!
//! Agent sessions take seconds to connect, so the pool keeps a floor of warm
//! sessions ready and tops it up in the background as callers take them. It
//! never queues callers: when no idle session exists and the hard cap is
//! reached, `acquire` fails immediately with [`PoolError::Exhausted`].
//!
//! # Components
//!
//! - [`SessionPool`]: membership, acquire/release, startup and shutdown
//! - `GrowthController`: keeps `keep_idle_size` sessions warm
//! - `IdleReaper`: reclaims stale idle sessions above the floor
//! - `HealthChecker`: evicts idle sessions that fail a probe
//! - [`PoolStats`]: point-in-time snapshot for the observability layer

pub mod config;
pub mod events;
pub mod growth;
pub mod health;
pub mod metrics;
pub mod pool;
pub mod reaper;
pub mod session;
mod task;

pub use config::{ConfigError, PoolConfig};
pub use events::PoolEvent;
pub use health::HealthReport;
pub use metrics::{PoolMetrics, PoolStats};
pub use pool::{PoolError, PoolResult, PooledSession, SessionPool};
pub use session::{AgentSession, SessionError, SessionFactory, SessionId, SessionState};
