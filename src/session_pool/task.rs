// ABOUTME: Background loop runner shared by the growth, reaper and health tasks
// ABOUTME: Each loop owns its own shutdown flag and survives failures of single passes

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Handle to one periodic maintenance loop.
///
/// The loop wakes on its interval, on an optional external trigger, or on
/// stop. Each pass runs in its own task so a panic inside a pass is logged
/// and the loop carries on with the next tick.
pub(crate) struct MaintenanceTask {
    name: &'static str,
    shutdown: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceTask {
    /// Spawn the loop. `pass` returns `None` once the pool is gone, which
    /// ends the loop.
    pub(crate) fn spawn<P, Fut>(
        name: &'static str,
        interval: Duration,
        trigger: Option<Arc<Notify>>,
        mut pass: P,
    ) -> Self
    where
        P: FnMut() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop_signal = Arc::new(Notify::new());

        let loop_shutdown = Arc::clone(&shutdown);
        let loop_stop = Arc::clone(&stop_signal);

        let handle = tokio::spawn(async move {
            // First pass happens one interval after start
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!(task = name, "Maintenance loop started");

            loop {
                tokio::select! {
                    () = loop_stop.notified() => {}
                    _ = ticker.tick() => {}
                    () = wait_for_trigger(trigger.as_deref()) => {}
                }

                if loop_shutdown.load(Ordering::SeqCst) {
                    debug!(task = name, "Maintenance loop received shutdown signal");
                    break;
                }

                let Some(fut) = pass() else {
                    debug!(task = name, "Pool dropped, maintenance loop exiting");
                    break;
                };

                if let Err(e) = tokio::spawn(fut).await {
                    error!(task = name, error = %e, "Maintenance pass failed, continuing on next tick");
                }
            }

            debug!(task = name, "Maintenance loop ended");
        });

        info!(task = name, interval_ms = %interval.as_millis(), "Maintenance task started");

        Self {
            name,
            shutdown,
            stop_signal,
            handle: Some(handle),
        }
    }

    /// Ask the loop to stop without waiting for it.
    pub(crate) fn signal_stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.stop_signal.notify_one();
    }

    /// Stop the loop and wait up to `timeout` for it to finish its current pass.
    pub(crate) async fn stop(&mut self, timeout: Duration) {
        self.signal_stop();

        if let Some(handle) = self.handle.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!(task = self.name, "Maintenance task did not stop in time, aborting");
                abort.abort();
            }
        }

        info!(task = self.name, "Maintenance task stopped");
    }

    /// Check if the loop is still running.
    pub(crate) fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
            && !self.shutdown.load(Ordering::SeqCst)
    }
}

impl Drop for MaintenanceTask {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

async fn wait_for_trigger(trigger: Option<&Notify>) {
    match trigger {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}
