// ABOUTME: Lifecycle contract for pooled agent sessions and the factory that builds them
//
// The pool never looks inside a session. It only needs to:
// - create an unconnected handle (factory)
// - connect it (slow, may fail)
// - clear its per-use state between checkouts
// - probe its health while idle
// - disconnect it when it leaves the pool

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// === Session ID ===

/// Unique identifier for a pooled session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// === Session State ===

/// Where a session currently is in its pool lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connection in progress (counted as a reservation)
    Connecting,
    /// Connected and waiting in the idle set
    Idle,
    /// Checked out by a caller
    Active,
    /// Failed a health probe, about to be disconnected
    Unhealthy,
    /// Removed from the pool; never reused
    Disconnected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Unhealthy => "unhealthy",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

// === Session Errors ===

/// Failures reported by a session implementation
#[derive(Debug, Error)]
pub enum SessionError {
    /// The agent backend refused or dropped the connection
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Creation task ended without producing a session
    #[error("Session creation aborted: {0}")]
    Aborted(String),
}

// === Session Contract ===

/// An expensive, stateful agent session handle.
///
/// Implementations use interior mutability: the pool shares a handle with
/// its background health probe while the handle sits idle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentSession: Send + Sync + 'static {
    /// Establish the underlying connection. May take seconds.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Reset conversation history, tool state and counters so the session
    /// is indistinguishable from a freshly connected one.
    fn clear_state(&self);

    /// Liveness probe, only ever called on idle sessions.
    async fn is_healthy(&self) -> bool;

    /// Best-effort teardown.
    async fn disconnect(&self);
}

/// Produces new, unconnected sessions on demand
pub trait SessionFactory: Send + Sync + 'static {
    /// Concrete session type this factory builds
    type Session: AgentSession;

    /// Build an unconnected session handle
    fn create(&self) -> Self::Session;
}

impl<F, S> SessionFactory for F
where
    F: Fn() -> S + Send + Sync + 'static,
    S: AgentSession,
{
    type Session = S;

    fn create(&self) -> S {
        self()
    }
}
