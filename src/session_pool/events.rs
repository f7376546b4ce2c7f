// ABOUTME: Notification events the pool publishes for the presentation layer
//
// Events are JSON-tagged so a UI can forward them to the browser unchanged:
//   {"type":"pool_creating_agent","estimated_seconds":5}
//   {"type":"pool_exhausted","pool_size":3,"in_use":3}

use serde::{Deserialize, Serialize};

use super::session::SessionId;

/// Capacity of the broadcast channel; slow subscribers see `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Pool notification consumed by an external UI/observability layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PoolEvent {
    /// `acquire` found no idle session and is creating one for the caller
    #[serde(rename = "pool_creating_agent")]
    CreatingAgent {
        /// Rough time until the session is ready
        estimated_seconds: u64,
    },

    /// `acquire` failed fast because the pool is at capacity
    #[serde(rename = "pool_exhausted")]
    Exhausted {
        /// Configured hard cap
        pool_size: usize,
        /// Sessions currently checked out
        in_use: usize,
    },

    /// Idle session removed after failing a health probe
    #[serde(rename = "pool_session_evicted")]
    SessionEvicted {
        /// Evicted session
        session_id: SessionId,
    },

    /// Idle session above the floor disconnected after its idle timeout
    #[serde(rename = "pool_session_reclaimed")]
    SessionReclaimed {
        /// Reclaimed session
        session_id: SessionId,
        /// How long it had been idle
        idle_secs: u64,
    },
}

impl PoolEvent {
    /// Wire name of the event, as it appears in the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreatingAgent { .. } => "pool_creating_agent",
            Self::Exhausted { .. } => "pool_exhausted",
            Self::SessionEvicted { .. } => "pool_session_evicted",
            Self::SessionReclaimed { .. } => "pool_session_reclaimed",
        }
    }
}
