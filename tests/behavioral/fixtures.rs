// ABOUTME: Shared test fixtures and utilities for behavioral tests
//
// Provides:
// - FakeBackend: knobs and counters shared by every fake session
// - FakeSession / FakeFactory: AgentSession + SessionFactory over the backend
// - pool_config(): quiet config with maintenance ticks pushed far out
// - settle(): wait until no creation is in flight

use agent_pool::session_pool::{
    AgentSession, PoolConfig, SessionError, SessionFactory, SessionPool,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Behavior and counters shared between a factory and its sessions
#[derive(Default)]
pub struct FakeBackend {
    pub created: AtomicUsize,
    pub connects: AtomicUsize,
    pub clears: AtomicUsize,
    pub health_checks: AtomicUsize,
    pub disconnects: AtomicUsize,
    /// When set, every connect fails
    pub fail_connects: AtomicBool,
    /// Serials (1-based creation order) that report unhealthy
    pub unhealthy: Mutex<HashSet<usize>>,
    connect_delay: Mutex<Duration>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_connect_delay(delay: Duration) -> Arc<Self> {
        let backend = Self::default();
        *backend.connect_delay.lock() = delay;
        Arc::new(backend)
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub fn mark_unhealthy(&self, serial: usize) {
        self.unhealthy.lock().insert(serial);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Fake agent session with a conversation history
pub struct FakeSession {
    pub serial: usize,
    backend: Arc<FakeBackend>,
    history: Mutex<Vec<String>>,
}

impl FakeSession {
    pub fn say(&self, message: &str) {
        self.history.lock().push(message.to_string());
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }
}

#[async_trait]
impl AgentSession for FakeSession {
    async fn connect(&self) -> Result<(), SessionError> {
        let delay = *self.backend.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_connects.load(Ordering::SeqCst) {
            return Err(SessionError::ConnectFailed(format!(
                "fake backend refused session #{}",
                self.serial
            )));
        }
        Ok(())
    }

    fn clear_state(&self) {
        self.history.lock().clear();
        self.backend.clears.fetch_add(1, Ordering::SeqCst);
    }

    async fn is_healthy(&self) -> bool {
        self.backend.health_checks.fetch_add(1, Ordering::SeqCst);
        !self.backend.unhealthy.lock().contains(&self.serial)
    }

    async fn disconnect(&self) {
        self.backend.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory building fake sessions over one backend
pub struct FakeFactory {
    pub backend: Arc<FakeBackend>,
}

impl FakeFactory {
    pub fn new(backend: &Arc<FakeBackend>) -> Self {
        Self {
            backend: Arc::clone(backend),
        }
    }
}

impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    fn create(&self) -> FakeSession {
        let serial = self.backend.created.fetch_add(1, Ordering::SeqCst) + 1;
        FakeSession {
            serial,
            backend: Arc::clone(&self.backend),
            history: Mutex::new(Vec::new()),
        }
    }
}

/// Pool config with background ticks far enough out that only explicit
/// signals and direct pass calls drive maintenance
pub fn pool_config(initial_size: usize, keep_idle_size: usize, max_size: usize) -> PoolConfig {
    PoolConfig {
        initial_size,
        keep_idle_size,
        max_size,
        idle_timeout: Duration::from_secs(300),
        health_check_interval: Duration::from_secs(3600),
        growth_check_interval: Duration::from_secs(3600),
        ..PoolConfig::default()
    }
}

/// Let spawned warm-ups and triggered deficit checks run to completion.
///
/// Polls until no creation is in flight; panics if that takes over 5 s.
pub async fn settle(pool: &SessionPool<FakeFactory>) {
    let quiet = async {
        loop {
            for _ in 0..20 {
                tokio::task::yield_now().await;
            }
            if pool.stats().reserved == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), quiet)
        .await
        .expect("pool did not settle within 5s");
}
