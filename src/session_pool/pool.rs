// ABOUTME: Pool core owning idle/active/reserved membership for agent sessions
// ABOUTME: Implements fail-fast acquire, state-clearing release, startup warm-up and shutdown

//! Agent Session Pool Core
//!
//! `SessionPool` hands out pre-warmed agent sessions. It is the only
//! component that mutates membership; the growth controller, idle reaper and
//! health checker act through the same guarded state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SessionPool                           │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  state: Mutex<PoolState>                               │  │
//! │  │     idle:     [s1, s4, s7]   (LIFO, top = last used)   │  │
//! │  │     active:   {s2 -> ctx-a, s3 -> ctx-b}               │  │
//! │  │     reserved: 1              (creations in flight)     │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! │  ┌────────────────┐  ┌──────────────┐  ┌─────────────────┐  │
//! │  │GrowthController│  │  IdleReaper  │  │  HealthChecker  │  │
//! │  │ (deficit fill) │  │(excess idle) │  │ (evict broken)  │  │
//! │  └────────────────┘  └──────────────┘  └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lock only guards bookkeeping. Connect, disconnect and health probes
//! always run outside it.
//!
//! # Usage
//!
//! ```ignore
//! use agent_pool::session_pool::{PoolConfig, SessionPool};
//!
//! let pool = SessionPool::start(PoolConfig::default(), MyFactory::new()).await?;
//!
//! let session = pool.acquire("chat-42", |secs| notify_ui(secs)).await?;
//! // ... use the session ...
//! pool.release(session);
//!
//! pool.shutdown().await?;
//! ```

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::{ConfigError, PoolConfig};
use super::events::{PoolEvent, EVENT_CHANNEL_CAPACITY};
use super::growth::GrowthController;
use super::health::{HealthChecker, HealthReport};
use super::metrics::{PoolMetrics, PoolStats};
use super::reaper::IdleReaper;
use super::session::{AgentSession, SessionError, SessionFactory, SessionId, SessionState};

// === Pool Errors ===

/// Errors surfaced to the caller of a pool operation
#[derive(Debug, Error)]
pub enum PoolError {
    /// No idle session and no capacity left; reported immediately
    #[error("Pool exhausted: {in_use} of {pool_size} sessions in use")]
    Exhausted {
        /// Configured hard cap
        pool_size: usize,
        /// Sessions currently checked out
        in_use: usize,
    },

    /// Creating or connecting the caller's on-demand session failed
    #[error("Session creation failed: {0}")]
    SessionCreation(#[from] SessionError),

    /// Pool has been shut down
    #[error("Pool is shutting down")]
    ShuttingDown,

    /// Configuration rejected at startup
    #[error("Configuration error: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

// === Membership ===

/// Pool-side record of one session
pub(crate) struct SessionSlot<S> {
    pub(crate) id: SessionId,
    pub(crate) session: Arc<S>,
    pub(crate) state: SessionState,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
    pub(crate) checkouts: u64,
}

impl<S: AgentSession> SessionSlot<S> {
    fn connecting(session: S) -> Self {
        let now = Instant::now();
        Self {
            id: SessionId::new(),
            session: Arc::new(session),
            state: SessionState::Connecting,
            created_at: now,
            last_used: now,
            checkouts: 0,
        }
    }

    /// Time since the session was connected or last released
    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }

    /// Remove the session for good. Never reused afterwards.
    ///
    /// Returns the final state, always `Disconnected`.
    pub(crate) async fn disconnect(mut self, reason: &'static str) -> SessionState {
        debug!(session_id = %self.id, state = %self.state, reason, "Disconnecting session");
        self.session.disconnect().await;
        self.state = SessionState::Disconnected;
        debug!(session_id = %self.id, checkouts = self.checkouts, "Session disconnected");
        self.state
    }
}

/// Checkout metadata for an active session
struct Checkout {
    context_id: String,
    checked_out_at: Instant,
}

/// Bookkeeping guarded by the pool lock
pub(crate) struct PoolState<S> {
    /// Available sessions; the last element is the most recently released
    pub(crate) idle: Vec<SessionSlot<S>>,
    active: HashMap<SessionId, Checkout>,
    /// Creations in flight, counted toward capacity
    pub(crate) reserved: usize,
    /// Subset of `reserved` destined for the idle set
    pub(crate) warming: usize,
}

impl<S> PoolState<S> {
    fn new() -> Self {
        Self {
            idle: Vec::new(),
            active: HashMap::new(),
            reserved: 0,
            warming: 0,
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn total(&self) -> usize {
        self.idle.len() + self.active.len() + self.reserved
    }
}

// === Reservations ===

/// What a reservation's session will become once connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReservationKind {
    /// Background warm-up, lands in the idle set
    Warm,
    /// Created for a waiting `acquire`, lands in the active set
    OnDemand,
}

/// A capacity slot held by an in-flight creation.
///
/// The slot is released exactly once: by `into_idle`/`into_active` on
/// success, or by `Drop` on failure, cancellation or panic.
pub(crate) struct Reservation<F: SessionFactory> {
    shared: Arc<PoolShared<F>>,
    kind: ReservationKind,
    armed: bool,
}

impl<F: SessionFactory> Reservation<F> {
    /// Take ownership of a slot already counted in `reserved`.
    pub(crate) fn adopt(shared: Arc<PoolShared<F>>, kind: ReservationKind) -> Self {
        Self {
            shared,
            kind,
            armed: true,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<PoolShared<F>> {
        &self.shared
    }

    fn settle(&mut self, state: &mut PoolState<F::Session>) {
        state.reserved -= 1;
        if self.kind == ReservationKind::Warm {
            state.warming -= 1;
        }
        self.armed = false;
    }

    /// Move a freshly connected session into the idle set.
    ///
    /// Returns the session back if the pool closed meanwhile; the caller must
    /// disconnect it.
    pub(crate) fn into_idle(
        mut self,
        mut slot: SessionSlot<F::Session>,
    ) -> Option<SessionSlot<F::Session>> {
        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        self.settle(&mut state);

        if shared.is_closed() {
            return Some(slot);
        }

        slot.state = SessionState::Idle;
        slot.last_used = Instant::now();
        state.idle.push(slot);
        None
    }

    /// Hand a freshly connected session straight to a caller.
    ///
    /// Returns the session back if the pool closed meanwhile; the caller must
    /// disconnect it.
    fn into_active(
        mut self,
        mut slot: SessionSlot<F::Session>,
        context_id: String,
    ) -> Result<PooledSession<F::Session>, SessionSlot<F::Session>> {
        let shared = Arc::clone(&self.shared);
        {
            let mut state = shared.state.lock();
            self.settle(&mut state);
            if shared.is_closed() {
                return Err(slot);
            }
            slot.state = SessionState::Active;
            slot.checkouts += 1;
            state.active.insert(
                slot.id,
                Checkout {
                    context_id: context_id.clone(),
                    checked_out_at: Instant::now(),
                },
            );
        }
        Ok(PooledSession::new(slot, context_id, &shared))
    }
}

impl<F: SessionFactory> Drop for Reservation<F> {
    fn drop(&mut self) {
        if self.armed {
            let shared = Arc::clone(&self.shared);
            let mut state = shared.state.lock();
            self.settle(&mut state);
        }
    }
}

// === Checked-out Session ===

/// Where a checked-out session goes back to
pub(crate) trait SessionHome<S>: Send + Sync {
    fn check_in(&self, slot: SessionSlot<S>);
}

/// A session checked out of the pool.
///
/// Return it with [`SessionPool::release`]. If it is dropped instead (caller
/// cancelled, panicked or forgot), it is returned to the pool automatically,
/// with its state cleared.
pub struct PooledSession<S: AgentSession> {
    id: SessionId,
    session: Arc<S>,
    context_id: String,
    created_at: Instant,
    checkouts: u64,
    pool_id: Uuid,
    home: Weak<dyn SessionHome<S>>,
    returned: bool,
}

impl<S: AgentSession> PooledSession<S> {
    fn new<F>(slot: SessionSlot<S>, context_id: String, shared: &Arc<PoolShared<F>>) -> Self
    where
        F: SessionFactory<Session = S>,
    {
        let weak = Arc::downgrade(shared);
        let home: Weak<dyn SessionHome<S>> = weak;
        Self {
            id: slot.id,
            session: slot.session,
            context_id,
            created_at: slot.created_at,
            checkouts: slot.checkouts,
            pool_id: shared.id,
            home,
            returned: false,
        }
    }

    /// Pool-assigned session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Context the session was acquired for
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Number of checkouts including this one
    pub fn checkouts(&self) -> u64 {
        self.checkouts
    }

    fn take_slot(&mut self) -> Option<SessionSlot<S>> {
        if self.returned {
            return None;
        }
        self.returned = true;
        Some(SessionSlot {
            id: self.id,
            session: Arc::clone(&self.session),
            state: SessionState::Active,
            created_at: self.created_at,
            last_used: Instant::now(),
            checkouts: self.checkouts,
        })
    }
}

impl<S: AgentSession> Deref for PooledSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: AgentSession> std::fmt::Debug for PooledSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("id", &self.id)
            .field("context_id", &self.context_id)
            .field("checkouts", &self.checkouts)
            .finish_non_exhaustive()
    }
}

impl<S: AgentSession> Drop for PooledSession<S> {
    fn drop(&mut self) {
        let Some(slot) = self.take_slot() else {
            return;
        };
        match self.home.upgrade() {
            Some(home) => {
                debug!(session_id = %self.id, "Session dropped without release, returning to pool");
                home.check_in(slot);
            }
            None => spawn_disconnect(slot, "pool dropped"),
        }
    }
}

fn spawn_disconnect<S: AgentSession>(slot: SessionSlot<S>, reason: &'static str) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(slot.disconnect(reason));
        }
        Err(_) => {
            warn!(session_id = %slot.id, reason, "No runtime available, dropping session without disconnect");
        }
    }
}

// === Shared Pool State ===

/// State shared between the pool handle, checked-out sessions and the
/// background maintenance tasks
pub(crate) struct PoolShared<F: SessionFactory> {
    pub(crate) id: Uuid,
    pub(crate) config: PoolConfig,
    factory: F,
    pub(crate) state: Mutex<PoolState<F::Session>>,
    pub(crate) metrics: PoolMetrics,
    pub(crate) growth_signal: Arc<Notify>,
    closed: AtomicBool,
    events: broadcast::Sender<PoolEvent>,
}

impl<F: SessionFactory> PoolShared<F> {
    fn new(config: PoolConfig, factory: F) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            metrics: PoolMetrics::new(config.latency_sample_capacity),
            config,
            factory,
            state: Mutex::new(PoolState::new()),
            growth_signal: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            events,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wake the growth controller. Repeated signals coalesce.
    pub(crate) fn signal_growth(&self) {
        self.growth_signal.notify_one();
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Create and connect a new session. Runs entirely outside the lock.
    pub(crate) async fn connect_new(&self) -> Result<SessionSlot<F::Session>, SessionError> {
        let slot = SessionSlot::connecting(self.factory.create());
        debug!(session_id = %slot.id, "Connecting new agent session");

        let started = Instant::now();
        slot.session.connect().await?;

        debug!(
            session_id = %slot.id,
            connect_ms = %started.elapsed().as_millis(),
            "Agent session connected"
        );
        Ok(slot)
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let (idle, active, reserved) = {
            let state = self.state.lock();
            (state.idle.len(), state.active.len(), state.reserved)
        };

        PoolStats {
            total: idle + active + reserved,
            idle,
            active,
            reserved,
            max_size: self.config.max_size,
            keep_idle_size: self.config.keep_idle_size,
            initial_size: self.config.initial_size,
            acquisitions_total: self.metrics.acquisitions_total.load(Ordering::Relaxed),
            on_demand_creations_total: self
                .metrics
                .on_demand_creations_total
                .load(Ordering::Relaxed),
            exhausted_total: self.metrics.exhausted_total.load(Ordering::Relaxed),
            creation_failures_total: self.metrics.creation_failures_total.load(Ordering::Relaxed),
            reclaimed_total: self.metrics.reclaimed_total.load(Ordering::Relaxed),
            evicted_total: self.metrics.evicted_total.load(Ordering::Relaxed),
            recent_acquire_latencies_ms: self.metrics.recent_latencies_ms(),
            captured_at: chrono::Utc::now(),
        }
    }
}

/// Outcome of returning a session to the pool
enum CheckIn<S> {
    Pooled,
    Closed(SessionSlot<S>),
    Unknown(SessionSlot<S>),
}

impl<F: SessionFactory> SessionHome<F::Session> for PoolShared<F> {
    fn check_in(&self, mut slot: SessionSlot<F::Session>) {
        // Clear before the session becomes visible to other callers
        slot.session.clear_state();
        slot.last_used = Instant::now();

        let outcome = {
            let mut state = self.state.lock();
            match state.active.remove(&slot.id) {
                Some(checkout) => {
                    debug!(
                        session_id = %slot.id,
                        context_id = %checkout.context_id,
                        held_ms = %checkout.checked_out_at.elapsed().as_millis(),
                        "Session released"
                    );
                    if self.is_closed() {
                        CheckIn::Closed(slot)
                    } else {
                        slot.state = SessionState::Idle;
                        state.idle.push(slot);
                        CheckIn::Pooled
                    }
                }
                None => CheckIn::Unknown(slot),
            }
        };

        match outcome {
            CheckIn::Pooled => self.signal_growth(),
            CheckIn::Closed(slot) => spawn_disconnect(slot, "released after shutdown"),
            CheckIn::Unknown(slot) => {
                warn!(session_id = %slot.id, "Released session was not checked out, disconnecting");
                spawn_disconnect(slot, "unknown session released");
            }
        }
    }
}

impl<F: SessionFactory> Drop for PoolShared<F> {
    fn drop(&mut self) {
        let idle = std::mem::take(&mut self.state.get_mut().idle);
        for slot in idle {
            spawn_disconnect(slot, "pool dropped");
        }
    }
}

// === Session Pool ===

/// Background maintenance tasks owned by a running pool
struct Maintenance {
    growth: GrowthController,
    reaper: IdleReaper,
    health: HealthChecker,
}

impl Maintenance {
    fn start<F: SessionFactory>(shared: &Arc<PoolShared<F>>) -> Self {
        Self {
            growth: GrowthController::start(shared),
            reaper: IdleReaper::start(shared),
            health: HealthChecker::start(shared),
        }
    }

    fn is_running(&self) -> bool {
        self.growth.is_running() && self.reaper.is_running() && self.health.is_running()
    }

    fn signal_stop(&self) {
        self.growth.signal_stop();
        self.reaper.signal_stop();
        self.health.signal_stop();
    }

    async fn stop(&mut self, timeout: Duration) {
        self.growth.stop(timeout).await;
        self.reaper.stop(timeout).await;
        self.health.stop(timeout).await;
    }
}

/// Dynamic pool of pre-warmed agent sessions.
///
/// Construct exactly one per application with [`SessionPool::start`] and
/// share it (typically behind an `Arc`) wherever sessions are needed.
pub struct SessionPool<F: SessionFactory> {
    shared: Arc<PoolShared<F>>,
    maintenance: Mutex<Option<Maintenance>>,
}

impl<F: SessionFactory> std::fmt::Debug for SessionPool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("config", &self.shared.config)
            .field("closed", &self.shared.is_closed())
            .finish_non_exhaustive()
    }
}

impl<F: SessionFactory> SessionPool<F> {
    /// Start the pool.
    ///
    /// This performs:
    /// 1. Configuration validation
    /// 2. Synchronous creation of the first session, so the pool is usable
    ///    as soon as this returns
    /// 3. Background creation of the remaining `initial_size - 1` sessions
    /// 4. Start of the growth controller, idle reaper and health checker
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(config: PoolConfig, factory: F) -> PoolResult<Self> {
        config.validate()?;

        info!(
            initial_size = config.initial_size,
            keep_idle_size = config.keep_idle_size,
            max_size = config.max_size,
            "Starting agent session pool"
        );

        let shared = Arc::new(PoolShared::new(config, factory));

        for reservation in shared.reserve_warm(1) {
            match shared.connect_new().await {
                Ok(slot) => {
                    if let Some(orphan) = reservation.into_idle(slot) {
                        orphan.disconnect("pool closed during startup").await;
                    }
                }
                Err(e) => {
                    shared.metrics.record_creation_failure();
                    warn!(error = %e, "Failed to create first agent session");
                    return Err(PoolError::SessionCreation(e));
                }
            }
        }

        let remaining = shared.config.initial_size.saturating_sub(1);
        let reservations = shared.reserve_warm(remaining);
        shared.spawn_warm(reservations);

        let maintenance = Maintenance::start(&shared);
        // Covers keep_idle_size > initial_size without waiting for the backstop
        shared.signal_growth();

        info!("Agent session pool started");
        Ok(Self {
            shared,
            maintenance: Mutex::new(Some(maintenance)),
        })
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Check if the pool has been shut down
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Check if all background maintenance loops are still running
    pub fn is_maintained(&self) -> bool {
        self.maintenance
            .lock()
            .as_ref()
            .is_some_and(Maintenance::is_running)
    }

    /// Check out a session for `context_id`.
    ///
    /// Serves the most recently released idle session if there is one.
    /// Otherwise creates one on demand if capacity allows, calling
    /// `on_creating` with the estimated wait first. Otherwise fails
    /// immediately with [`PoolError::Exhausted`]; this never waits for
    /// another caller's release.
    ///
    /// If the returned future is dropped while a session is being created,
    /// the creation still completes and the session joins the idle set.
    pub async fn acquire<C>(
        &self,
        context_id: &str,
        on_creating: C,
    ) -> PoolResult<PooledSession<F::Session>>
    where
        C: FnOnce(u64) + Send,
    {
        if self.shared.is_closed() {
            return Err(PoolError::ShuttingDown);
        }

        let started = Instant::now();

        enum Plan<F: SessionFactory> {
            Reuse(SessionSlot<F::Session>),
            Create,
            Exhausted { pool_size: usize, in_use: usize },
        }

        let plan: Plan<F> = {
            let mut state = self.shared.state.lock();
            if let Some(mut slot) = state.idle.pop() {
                slot.state = SessionState::Active;
                slot.checkouts += 1;
                state.active.insert(
                    slot.id,
                    Checkout {
                        context_id: context_id.to_string(),
                        checked_out_at: started,
                    },
                );
                Plan::Reuse(slot)
            } else if state.total() < self.shared.config.max_size {
                state.reserved += 1;
                Plan::Create
            } else {
                Plan::Exhausted {
                    pool_size: self.shared.config.max_size,
                    in_use: state.active.len(),
                }
            }
        };

        match plan {
            Plan::Reuse(slot) => {
                debug!(session_id = %slot.id, context_id, "Serving idle session");
                self.shared.metrics.record_acquisition(started.elapsed());
                self.shared.signal_growth();
                Ok(PooledSession::new(slot, context_id.to_string(), &self.shared))
            }
            Plan::Create => {
                let reservation =
                    Reservation::adopt(Arc::clone(&self.shared), ReservationKind::OnDemand);
                self.create_on_demand(reservation, context_id, on_creating, started)
                    .await
            }
            Plan::Exhausted { pool_size, in_use } => {
                self.shared.metrics.record_exhausted();
                self.shared.emit(PoolEvent::Exhausted { pool_size, in_use });
                warn!(context_id, pool_size, in_use, "Pool exhausted, failing fast");
                Err(PoolError::Exhausted { pool_size, in_use })
            }
        }
    }

    async fn create_on_demand<C>(
        &self,
        reservation: Reservation<F>,
        context_id: &str,
        on_creating: C,
        started: Instant,
    ) -> PoolResult<PooledSession<F::Session>>
    where
        C: FnOnce(u64) + Send,
    {
        let estimated_seconds = self.shared.config.estimated_creation_secs;
        on_creating(estimated_seconds);
        self.shared.emit(PoolEvent::CreatingAgent { estimated_seconds });
        self.shared.metrics.record_on_demand_creation();
        info!(context_id, estimated_seconds, "No idle session, creating one on demand");

        // The creation runs in its own task so a cancelled caller cannot
        // strand the reservation or the half-built session.
        let (tx, rx) = oneshot::channel();
        let context = context_id.to_string();
        tokio::spawn(async move {
            let created = reservation.shared().connect_new().await;
            let result = match created {
                Ok(slot) => match reservation.into_active(slot, context) {
                    Ok(session) => Ok(session),
                    Err(orphan) => {
                        orphan.disconnect("pool closed during creation").await;
                        Err(PoolError::ShuttingDown)
                    }
                },
                Err(e) => {
                    drop(reservation);
                    Err(PoolError::SessionCreation(e))
                }
            };
            if tx.send(result).is_err() {
                debug!("Caller went away during creation, session returned to idle set");
            }
        });

        match rx.await {
            Ok(Ok(session)) => {
                self.shared.metrics.record_acquisition(started.elapsed());
                debug!(session_id = %session.id(), context_id, "Serving newly created session");
                Ok(session)
            }
            Ok(Err(PoolError::SessionCreation(e))) => {
                self.shared.metrics.record_creation_failure();
                warn!(context_id, error = %e, "On-demand session creation failed");
                Err(PoolError::SessionCreation(e))
            }
            Ok(Err(e)) => {
                debug!(context_id, error = %e, "On-demand session discarded");
                Err(e)
            }
            Err(_) => {
                self.shared.metrics.record_creation_failure();
                warn!(context_id, "On-demand creation task ended without a result");
                Err(PoolError::SessionCreation(SessionError::Aborted(
                    "creation task ended unexpectedly".to_string(),
                )))
            }
        }
    }

    /// Return a session to the pool.
    ///
    /// Clears its per-use state, moves it from active to idle and triggers a
    /// deficit check. After shutdown the session is disconnected instead.
    pub fn release(&self, session: PooledSession<F::Session>) {
        let mut session = session;
        if session.pool_id != self.shared.id {
            warn!(session_id = %session.id(), "Session released to a pool that does not own it");
            // Drop routes it back to its own pool
            return;
        }
        if let Some(slot) = session.take_slot() {
            self.shared.check_in(slot);
        }
    }

    /// Point-in-time snapshot of pool composition and counters
    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /// Subscribe to pool notification events
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    /// Run one deficit check now. Returns the number of creations scheduled.
    pub fn check_deficit(&self) -> usize {
        self.shared.check_deficit()
    }

    /// Run one idle reaper pass now. Returns the number of sessions reclaimed.
    pub async fn reap_idle(&self) -> usize {
        self.shared.reap_idle().await
    }

    /// Run one health checker pass now.
    pub async fn check_health(&self) -> HealthReport {
        self.shared.check_idle_health().await
    }

    /// Shut the pool down gracefully
    ///
    /// This:
    /// 1. Rejects further acquisitions
    /// 2. Stops the growth controller, idle reaper and health checker
    /// 3. Disconnects every idle session
    ///
    /// Sessions still checked out are disconnected when released.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` if the pool was already shut down.
    pub async fn shutdown(&self) -> PoolResult<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }

        info!("Shutting down agent session pool");

        let maintenance = self.maintenance.lock().take();
        if let Some(mut maintenance) = maintenance {
            maintenance.stop(self.shared.config.shutdown_timeout).await;
        }

        let (drained, still_active) = {
            let mut state = self.shared.state.lock();
            (std::mem::take(&mut state.idle), state.active.len())
        };
        let disconnected = drained.len();
        join_all(drained.into_iter().map(|slot| slot.disconnect("pool shutdown"))).await;

        info!(disconnected, still_active, "Agent session pool shutdown complete");
        Ok(())
    }
}

impl<F: SessionFactory> Drop for SessionPool<F> {
    fn drop(&mut self) {
        // Async cleanup cannot be done in Drop; callers should call
        // shutdown() explicitly for graceful disconnects.
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(maintenance) = self.maintenance.get_mut().as_ref() {
            maintenance.signal_stop();
        }
    }
}

#[cfg(test)]
impl<F: SessionFactory> SessionPool<F> {
    /// Wait until no creation is in flight and spawned follow-ups have run.
    pub(crate) async fn settle(&self) {
        let quiet = async {
            loop {
                for _ in 0..20 {
                    tokio::task::yield_now().await;
                }
                if self.stats().reserved == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), quiet)
            .await
            .expect("pool did not settle");
    }
}
