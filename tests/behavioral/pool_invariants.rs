// ABOUTME: Behavioral tests for membership invariants under concurrent load
// Verifies no session is ever handed to two callers and the hard cap holds

use crate::fixtures::{pool_config, settle, FakeBackend, FakeFactory};
use agent_pool::session_pool::{PoolError, SessionId, SessionPool};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Concurrent callers never share a session and the cap is never exceeded
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invariants_hold_under_concurrent_churn() {
    let backend = FakeBackend::with_connect_delay(Duration::from_millis(2));
    let pool = Arc::new(
        SessionPool::start(pool_config(2, 2, 4), FakeFactory::new(&backend))
            .await
            .expect("pool should start"),
    );

    let held: Arc<Mutex<HashSet<SessionId>>> = Arc::new(Mutex::new(HashSet::new()));
    let served = Arc::new(AtomicUsize::new(0));
    let exhausted = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    // Sample stats continuously while workers churn
    let monitor = {
        let pool = Arc::clone(&pool);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut samples = 0;
            while !done.load(Ordering::SeqCst) {
                let stats = pool.stats();
                assert!(
                    stats.total <= stats.max_size,
                    "total {} exceeded max_size {}",
                    stats.total,
                    stats.max_size
                );
                assert_eq!(stats.total, stats.idle + stats.active + stats.reserved);
                samples += 1;
                tokio::task::yield_now().await;
            }
            samples
        })
    };

    let workers: Vec<_> = (0..12)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            let held = Arc::clone(&held);
            let served = Arc::clone(&served);
            let exhausted = Arc::clone(&exhausted);
            tokio::spawn(async move {
                for round in 0..25 {
                    let context = format!("w{worker}-r{round}");
                    match pool.acquire(&context, |_| {}).await {
                        Ok(session) => {
                            assert!(
                                held.lock().insert(session.id()),
                                "session {} handed out twice",
                                session.id()
                            );
                            served.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(1)).await;
                            held.lock().remove(&session.id());
                            pool.release(session);
                        }
                        Err(PoolError::Exhausted { pool_size, in_use }) => {
                            assert_eq!(pool_size, 4);
                            assert!(in_use <= 4);
                            exhausted.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                        }
                        Err(e) => panic!("unexpected acquire error: {e}"),
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.await.expect("worker should not panic");
    }
    done.store(true, Ordering::SeqCst);
    let samples = monitor.await.expect("monitor should not panic");
    assert!(samples > 0);

    settle(&pool).await;
    let stats = pool.stats();
    assert_eq!(stats.active, 0, "all sessions were released");
    assert_eq!(stats.reserved, 0);
    assert!(stats.total <= 4);
    assert_eq!(
        served.load(Ordering::SeqCst) + exhausted.load(Ordering::SeqCst),
        12 * 25
    );
    assert_eq!(stats.acquisitions_total, served.load(Ordering::SeqCst) as u64);
    assert_eq!(stats.exhausted_total, exhausted.load(Ordering::SeqCst) as u64);
}

/// Every creation is accounted for: connected sessions are either pooled,
/// checked out, or disconnected
#[tokio::test]
async fn test_every_connected_session_is_accounted_for() {
    let backend = FakeBackend::new();
    let pool = SessionPool::start(pool_config(2, 2, 5), FakeFactory::new(&backend))
        .await
        .expect("pool should start");
    settle(&pool).await;

    let a = pool.acquire("a", |_| {}).await.expect("a");
    let b = pool.acquire("b", |_| {}).await.expect("b");
    let c = pool.acquire("c", |_| {}).await.expect("c");
    settle(&pool).await;

    let stats = pool.stats();
    let connected = FakeBackend::count(&backend.connects);
    let disconnected = FakeBackend::count(&backend.disconnects);
    assert_eq!(connected - disconnected, stats.idle + stats.active);
    assert_eq!(stats.active, 3);
    assert_eq!(stats.idle, 2, "growth refilled the floor");

    pool.release(a);
    pool.release(b);
    pool.release(c);
    assert_eq!(pool.stats().active, 0);
}
