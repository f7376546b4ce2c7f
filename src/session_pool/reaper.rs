// ABOUTME: Idle reaper reclaiming sessions idle longer than idle_timeout
// ABOUTME: Only reclaims the excess above keep_idle_size; the warm floor is never reaped

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::events::PoolEvent;
use super::pool::PoolShared;
use super::session::{SessionFactory, SessionId};
use super::task::MaintenanceTask;

/// Background task that disconnects stale idle sessions.
///
/// Expired sessions needed to keep `keep_idle_size` warm are kept; they are
/// looked at again on the next tick and only reclaimed once there is excess.
pub(crate) struct IdleReaper {
    task: MaintenanceTask,
}

impl IdleReaper {
    pub(crate) fn start<F: SessionFactory>(shared: &Arc<PoolShared<F>>) -> Self {
        let weak = Arc::downgrade(shared);
        let task = MaintenanceTask::spawn(
            "idle_reaper",
            shared.config.health_check_interval,
            None,
            move || {
                weak.upgrade().map(|shared| async move {
                    shared.reap_idle().await;
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

    /// Check if the reaper loop is still running.
    pub(crate) fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

impl<F: SessionFactory> PoolShared<F> {
    /// Reclaim expired idle sessions above the floor, oldest first.
    ///
    /// Returns the number of sessions disconnected.
    pub(crate) async fn reap_idle(self: &Arc<Self>) -> usize {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;

        let expired = {
            let mut state = self.state.lock();
            let excess = state.idle.len().saturating_sub(self.config.keep_idle_size);
            if excess == 0 {
                return 0;
            }

            let mut candidates: Vec<(Instant, SessionId)> = state
                .idle
                .iter()
                .filter(|slot| slot.idle_for(now) > idle_timeout)
                .map(|slot| (slot.last_used, slot.id))
                .collect();
            candidates.sort_by_key(|(last_used, _)| *last_used);

            let doomed: HashSet<SessionId> = candidates
                .into_iter()
                .take(excess)
                .map(|(_, id)| id)
                .collect();
            if doomed.is_empty() {
                return 0;
            }

            let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.idle)
                .into_iter()
                .partition(|slot| doomed.contains(&slot.id));
            state.idle = kept;
            expired
        };

        let reclaimed = expired.len();
        for slot in expired {
            let idle_secs = slot.idle_for(now).as_secs();
            let session_id = slot.id;
            info!(session_id = %session_id, idle_secs, "Reclaiming idle session");
            slot.disconnect("idle timeout").await;
            self.metrics.record_reclaimed();
            self.emit(PoolEvent::SessionReclaimed {
                session_id,
                idle_secs,
            });
        }

        debug!(reclaimed, "Idle reaper pass complete");
        self.signal_growth();
        reclaimed
    }
}
