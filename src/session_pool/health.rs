// ABOUTME: Health checking for idle pooled sessions with configurable check interval
// ABOUTME: Background task that probes idle sessions and silently evicts unhealthy ones

//! Health checking for the agent session pool.
//!
//! The `HealthChecker` runs as a background task that:
//! - Probes every idle session at `health_check_interval`
//! - Evicts sessions that fail the probe and are still idle
//! - Triggers a deficit check so the growth controller refills the floor
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    HealthChecker                        │
//! │                                                         │
//! │  ┌──────────────┐    ┌──────────────┐                  │
//! │  │ Check Loop   │───▶│ Probe idle   │ (outside lock)   │
//! │  │ (interval)   │    │  sessions    │                  │
//! │  └──────────────┘    └──────────────┘                  │
//! │                              │                          │
//! │                              ▼                          │
//! │                      ┌──────────────┐                  │
//! │                      │ Evict if     │ (under lock)     │
//! │                      │ still idle   │                  │
//! │                      └──────────────┘                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Checked-out sessions are never health checked. A session that failed its
//! probe but was acquired before eviction is left to its caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use super::events::PoolEvent;
use super::pool::PoolShared;
use super::session::{AgentSession, SessionFactory, SessionId, SessionState};
use super::task::MaintenanceTask;

/// Upper bound on a single health probe
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

// === Health Report ===

/// Result of one health checker pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Idle sessions checked.
    pub checked: usize,

    /// Sessions evicted after failing the probe.
    pub evicted: Vec<SessionId>,

    /// Sessions that failed the probe but were checked out before eviction.
    pub skipped: usize,
}

impl HealthReport {
    /// Check if every checked session was healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.evicted.is_empty() && self.skipped == 0
    }
}

// === Health Checker ===

/// Background health checker for idle pooled sessions.
pub(crate) struct HealthChecker {
    task: MaintenanceTask,
}

impl HealthChecker {
    pub(crate) fn start<F: SessionFactory>(shared: &Arc<PoolShared<F>>) -> Self {
        let weak = Arc::downgrade(shared);
        let task = MaintenanceTask::spawn(
            "health_checker",
            shared.config.health_check_interval,
            None,
            move || {
                weak.upgrade().map(|shared| async move {
                    let report = shared.check_idle_health().await;
                    if report.is_healthy() {
                        debug!(checked = report.checked, "All idle sessions healthy");
                    }
                })
            },
        );
        Self { task }
    }

    pub(crate) fn signal_stop(&self) {
        self.task.signal_stop();
    }

    pub(crate) async fn stop(&mut self, timeout: Duration) {
        self.task.stop(timeout).await;
    }

    /// Check if the checker loop is still running.
    pub(crate) fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

impl<F: SessionFactory> PoolShared<F> {
    /// Probe all idle sessions and evict the unhealthy ones.
    pub(crate) async fn check_idle_health(self: &Arc<Self>) -> HealthReport {
        // Snapshot handles so probes run without the lock
        let candidates: Vec<(SessionId, Arc<F::Session>)> = {
            let state = self.state.lock();
            state
                .idle
                .iter()
                .map(|slot| (slot.id, Arc::clone(&slot.session)))
                .collect()
        };

        let checks = candidates.iter().map(|(id, session)| async move {
            (*id, check_with_timeout(&**session, HEALTH_CHECK_TIMEOUT).await)
        });
        let unhealthy: HashSet<SessionId> = join_all(checks)
            .await
            .into_iter()
            .filter_map(|(id, healthy)| (!healthy).then_some(id))
            .collect();

        let mut report = HealthReport {
            checked: candidates.len(),
            ..HealthReport::default()
        };
        if unhealthy.is_empty() {
            return report;
        }

        let evicted = {
            let mut state = self.state.lock();
            let (evicted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.idle)
                .into_iter()
                .partition(|slot| unhealthy.contains(&slot.id));
            state.idle = kept;
            evicted
        };
        report.skipped = unhealthy.len() - evicted.len();

        for mut slot in evicted {
            slot.state = SessionState::Unhealthy;
            warn!(session_id = %slot.id, "Evicting unhealthy idle session");
            report.evicted.push(slot.id);
            self.metrics.record_evicted();
            self.emit(PoolEvent::SessionEvicted {
                session_id: slot.id,
            });
            slot.disconnect("failed health check").await;
        }

        if report.skipped > 0 {
            debug!(
                skipped = report.skipped,
                "Unhealthy sessions were checked out before eviction"
            );
        }

        self.signal_growth();
        report
    }
}

/// Probe a single session with a deadline; a hung probe counts as unhealthy.
pub async fn check_with_timeout<S: AgentSession + ?Sized>(session: &S, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, session.is_healthy())
        .await
        .unwrap_or(false)
}
