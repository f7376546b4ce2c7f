// ABOUTME: Growth controller keeping keep_idle_size warm sessions ready
// ABOUTME: Deficit checks reserve capacity under the pool lock so concurrent checks never overshoot

//! Growth controller for the agent session pool.
//!
//! A deficit check runs whenever `acquire`/`release` signal it and on a
//! periodic backstop tick:
//!
//! ```text
//! deficit   = max(0, keep_idle_size - (idle + warming))
//! capacity  = max_size - (idle + active + reserved)
//! scheduled = min(deficit, capacity)
//! ```
//!
//! `warming` counts warm-up creations already in flight, so a second check
//! racing the first sees those reservations and schedules nothing extra.
//! Failed creations are logged and not retried here; the next check
//! naturally tries again because the failed reservation was released.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::pool::{PoolShared, Reservation, ReservationKind};
use super::session::SessionFactory;
use super::task::MaintenanceTask;

/// Background task that tops the idle set up to `keep_idle_size`.
pub(crate) struct GrowthController {
    task: MaintenanceTask,
}

impl GrowthController {
    pub(crate) fn start<F: SessionFactory>(shared: &Arc<PoolShared<F>>) -> Self {
        let weak = Arc::downgrade(shared);
        let task = MaintenanceTask::spawn(
            "growth",
            shared.config.growth_check_interval,
            Some(Arc::clone(&shared.growth_signal)),
            move || {
                weak.upgrade().map(|shared| async move {
                    shared.check_deficit();
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

    /// Check if the controller loop is still running.
    pub(crate) fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

impl<F: SessionFactory> PoolShared<F> {
    /// Compute the idle deficit and schedule that many warm creations.
    ///
    /// Returns the number of creations scheduled.
    pub(crate) fn check_deficit(self: &Arc<Self>) -> usize {
        if self.is_closed() {
            return 0;
        }

        let (scheduled, idle, active) = {
            let mut state = self.state.lock();
            let deficit = self
                .config
                .keep_idle_size
                .saturating_sub(state.idle.len() + state.warming);
            let capacity = self.config.max_size.saturating_sub(state.total());
            let scheduled = deficit.min(capacity);
            state.reserved += scheduled;
            state.warming += scheduled;
            (scheduled, state.idle.len(), state.active_count())
        };

        if scheduled == 0 {
            return 0;
        }

        debug!(
            scheduled,
            idle,
            active,
            keep_idle_size = self.config.keep_idle_size,
            "Deficit check scheduling warm sessions"
        );

        for _ in 0..scheduled {
            let reservation = Reservation::adopt(Arc::clone(self), ReservationKind::Warm);
            tokio::spawn(Self::grow_one(reservation));
        }
        scheduled
    }

    /// Reserve up to `wanted` warm slots, bounded by remaining capacity.
    pub(crate) fn reserve_warm(self: &Arc<Self>, wanted: usize) -> Vec<Reservation<F>> {
        let granted = {
            let mut state = self.state.lock();
            let granted = wanted.min(self.config.max_size.saturating_sub(state.total()));
            state.reserved += granted;
            state.warming += granted;
            granted
        };

        (0..granted)
            .map(|_| Reservation::adopt(Arc::clone(self), ReservationKind::Warm))
            .collect()
    }

    /// Create the reserved warm sessions in the background.
    pub(crate) fn spawn_warm(&self, reservations: Vec<Reservation<F>>) {
        if reservations.is_empty() {
            return;
        }
        info!(count = reservations.len(), "Warming sessions in background");
        for reservation in reservations {
            tokio::spawn(Self::grow_one(reservation));
        }
    }

    async fn grow_one(reservation: Reservation<F>) {
        let created = reservation.shared().connect_new().await;
        match created {
            Ok(slot) => {
                let session_id = slot.id;
                if let Some(orphan) = reservation.into_idle(slot) {
                    orphan.disconnect("pool closed during warm-up").await;
                } else {
                    debug!(session_id = %session_id, "Warm session joined idle set");
                }
            }
            Err(e) => {
                let shared = Arc::clone(reservation.shared());
                drop(reservation);
                shared.metrics.record_creation_failure();
                warn!(error = %e, "Background session creation failed");
            }
        }
    }
}
