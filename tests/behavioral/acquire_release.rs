// ABOUTME: Behavioral tests for acquire/release: fail-fast, state clearing, creation paths
// Covers exhaustion reporting, on-demand creation, failures and caller cancellation

use crate::fixtures::{pool_config, settle, FakeBackend, FakeFactory};
use agent_pool::session_pool::{PoolError, PoolEvent, SessionError, SessionPool};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ==================== Fail-fast ====================

#[tokio::test]
async fn test_exhaustion_is_reported_without_waiting() {
    let backend = FakeBackend::new();
    let pool = SessionPool::start(pool_config(1, 1, 1), FakeFactory::new(&backend))
        .await
        .expect("pool should start");

    let held = pool.acquire("holder", |_| {}).await.expect("first acquire");

    // The holder keeps its session far longer than the second caller waits
    let started = Instant::now();
    let result = pool.acquire("latecomer", |_| {}).await;
    let waited = started.elapsed();

    match result {
        Err(PoolError::Exhausted { pool_size, in_use }) => {
            assert_eq!(pool_size, 1);
            assert_eq!(in_use, 1);
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert!(
        waited < Duration::from_millis(50),
        "fail-fast took {waited:?}"
    );

    drop(held);
}

#[tokio::test]
async fn test_exhaustion_emits_event() {
    let backend = FakeBackend::new();
    let pool = SessionPool::start(pool_config(1, 0, 1), FakeFactory::new(&backend))
        .await
        .expect("pool should start");
    let mut events = pool.subscribe();

    let _held = pool.acquire("holder", |_| {}).await.expect("first acquire");
    assert!(pool.acquire("other", |_| {}).await.is_err());

    assert_eq!(
        events.try_recv().expect("event"),
        PoolEvent::Exhausted {
            pool_size: 1,
            in_use: 1
        }
    );
    assert_eq!(pool.stats().exhausted_total, 1);
}

// ==================== State clearing ====================

#[tokio::test]
async fn test_released_session_is_reacquired_clean() {
    let backend = FakeBackend::new();
    let pool = SessionPool::start(pool_config(1, 0, 1), FakeFactory::new(&backend))
        .await
        .expect("pool should start");

    let first = pool.acquire("chat-1", |_| {}).await.expect("acquire");
    let first_id = first.id();
    first.say("my secret plan");
    assert_eq!(first.history().len(), 1);
    pool.release(first);

    let second = pool.acquire("chat-2", |_| {}).await.expect("reacquire");
    assert_eq!(second.id(), first_id, "same session reused");
    assert_eq!(second.checkouts(), 2);
    assert!(second.history().is_empty(), "no history leaks across reuse");
    assert_eq!(FakeBackend::count(&backend.clears), 1);
}

#[tokio::test]
async fn test_idle_sessions_are_served_lifo() {
    let backend = FakeBackend::new();
    let pool = SessionPool::start(pool_config(1, 0, 3), FakeFactory::new(&backend))
        .await
        .expect("pool should start");

    let a = pool.acquire("a", |_| {}).await.expect("a");
    let b = pool.acquire("b", |_| {}).await.expect("b");
    let (a_id, b_id) = (a.id(), b.id());

    pool.release(a);
    pool.release(b);

    // b was released last, so it comes back first
    let next = pool.acquire("c", |_| {}).await.expect("c");
    assert_eq!(next.id(), b_id);
    let after = pool.acquire("d", |_| {}).await.expect("d");
    assert_eq!(after.id(), a_id);
}

// ==================== On-demand creation ====================

#[tokio::test]
async fn test_on_demand_creation_reports_estimate_once() {
    let backend = FakeBackend::new();
    let pool = SessionPool::start(pool_config(1, 0, 2), FakeFactory::new(&backend))
        .await
        .expect("pool should start");

    let mut idle_hits = 0;
    let _a = pool
        .acquire("a", |_| idle_hits += 1)
        .await
        .expect("idle hit");
    assert_eq!(idle_hits, 0, "idle hit never reports creation");

    let mut estimates = Vec::new();
    let _b = pool
        .acquire("b", |secs| estimates.push(secs))
        .await
        .expect("created on demand");
    assert_eq!(estimates, vec![pool.config().estimated_creation_secs]);
    assert_eq!(pool.stats().on_demand_creations_total, 1);
}

#[tokio::test]
async fn test_creation_failure_releases_reservation() {
    let backend = FakeBackend::new();
    let pool = SessionPool::start(pool_config(1, 0, 2), FakeFactory::new(&backend))
        .await
        .expect("pool should start");

    let _held = pool.acquire("held", |_| {}).await.expect("idle hit");
    let before = pool.stats();

    backend.fail_connects(true);
    let result = pool.acquire("doomed", |_| {}).await;
    assert!(matches!(
        result,
        Err(PoolError::SessionCreation(SessionError::ConnectFailed(_)))
    ));

    let after = pool.stats();
    assert_eq!(after.reserved, before.reserved);
    assert_eq!(after.total, before.total);
    assert_eq!(after.exhausted_total, 0);
    assert_eq!(after.creation_failures_total, 1);

    // Capacity is intact: the next attempt creates normally
    backend.fail_connects(false);
    let retried = pool.acquire("retry", |_| {}).await;
    assert!(retried.is_ok());
}

// ==================== Cancellation ====================

#[tokio::test]
async fn test_cancelled_acquire_lands_session_in_idle() {
    let backend = FakeBackend::new();
    let pool = Arc::new(
        SessionPool::start(pool_config(1, 0, 2), FakeFactory::new(&backend))
            .await
            .expect("pool should start"),
    );
    let _held = pool.acquire("held", |_| {}).await.expect("idle hit");

    backend.set_connect_delay(Duration::from_millis(100));
    let cancelled = tokio::time::timeout(
        Duration::from_millis(10),
        pool.acquire("impatient", |_| {}),
    )
    .await;
    assert!(cancelled.is_err(), "caller gave up mid-creation");
    assert_eq!(pool.stats().reserved, 1, "creation still in flight");

    settle(&pool).await;

    let stats = pool.stats();
    assert_eq!(stats.reserved, 0);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.idle, 1, "orphaned session joined the idle set");
    assert_eq!(FakeBackend::count(&backend.disconnects), 0);
}

#[tokio::test]
async fn test_dropped_session_is_returned_cleared() {
    let backend = FakeBackend::new();
    let pool = SessionPool::start(pool_config(1, 0, 1), FakeFactory::new(&backend))
        .await
        .expect("pool should start");

    {
        let session = pool.acquire("forgetful", |_| {}).await.expect("acquire");
        session.say("left behind");
    }

    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.idle, 1);

    let session = pool.acquire("next", |_| {}).await.expect("reacquire");
    assert!(session.history().is_empty());
    settle(&pool).await;
}
