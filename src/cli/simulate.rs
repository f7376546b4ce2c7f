// ABOUTME: CLI simulate command driving a pool of simulated agent sessions
//
// Spawns concurrent workers that acquire, use and release sessions, then
// prints what the pool did: how many acquisitions were served, how many hit
// the fail-fast exhaustion path, and the final pool stats.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use super::{OutputFormat, SimulateArgs};
use agent_pool::config::AppConfig;
use agent_pool::session_pool::{
    AgentSession, PoolError, PoolStats, SessionError, SessionFactory, SessionPool,
};

// === Simulated Session ===

/// Stand-in for a real agent session: slow to connect, keeps a history
pub struct SimulatedSession {
    serial: u64,
    connect_latency: Duration,
    fail_connect: bool,
    max_uses: u64,
    history: Mutex<Vec<String>>,
    uses: AtomicU64,
    connected: AtomicBool,
}

impl SimulatedSession {
    /// Record a message and return how many the session now holds
    pub fn send(&self, message: impl Into<String>) -> usize {
        let mut history = self.history.lock();
        history.push(message.into());
        history.len()
    }

    /// Messages since the last clear
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}

#[async_trait]
impl AgentSession for SimulatedSession {
    async fn connect(&self) -> Result<(), SessionError> {
        tokio::time::sleep(self.connect_latency).await;
        if self.fail_connect {
            return Err(SessionError::ConnectFailed(format!(
                "simulated failure on session #{}",
                self.serial
            )));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear_state(&self) {
        self.history.lock().clear();
        self.uses.fetch_add(1, Ordering::SeqCst);
    }

    async fn is_healthy(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && (self.max_uses == 0 || self.uses.load(Ordering::SeqCst) < self.max_uses)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        debug!(serial = self.serial, "Simulated session disconnected");
    }
}

/// Builds simulated sessions, failing every `fail_every`th connect
pub struct SimulatedFactory {
    connect_latency: Duration,
    fail_every: u64,
    max_uses: u64,
    created: AtomicU64,
}

impl SimulatedFactory {
    /// Create a factory; `fail_every` and `max_uses` of 0 disable those faults
    pub fn new(connect_latency: Duration, fail_every: u64, max_uses: u64) -> Self {
        Self {
            connect_latency,
            fail_every,
            max_uses,
            created: AtomicU64::new(0),
        }
    }
}

impl SessionFactory for SimulatedFactory {
    type Session = SimulatedSession;

    fn create(&self) -> SimulatedSession {
        let serial = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        SimulatedSession {
            serial,
            connect_latency: self.connect_latency,
            fail_connect: self.fail_every > 0 && serial % self.fail_every == 0,
            max_uses: self.max_uses,
            history: Mutex::new(Vec::new()),
            uses: AtomicU64::new(0),
            connected: AtomicBool::new(false),
        }
    }
}

// === Workload ===

/// Tally of one worker's acquisitions
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct WorkerTally {
    pub served: u64,
    pub served_after_creation: u64,
    pub exhausted: u64,
    pub failed: u64,
}

impl WorkerTally {
    fn merge(&mut self, other: Self) {
        self.served += other.served;
        self.served_after_creation += other.served_after_creation;
        self.exhausted += other.exhausted;
        self.failed += other.failed;
    }
}

/// JSON output structure for the simulate command
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub workers: usize,
    pub iterations: usize,
    pub elapsed_ms: u64,
    pub tally: WorkerTally,
    pub events: BTreeMap<&'static str, u64>,
    pub stats: PoolStats,
}

async fn run_worker(
    pool: Arc<SessionPool<SimulatedFactory>>,
    worker: usize,
    iterations: usize,
    hold: Duration,
) -> WorkerTally {
    let mut tally = WorkerTally::default();

    for round in 0..iterations {
        let context_id = format!("worker-{worker}-round-{round}");
        let mut waited = false;
        let acquired = pool
            .acquire(&context_id, |secs| {
                waited = true;
                debug!(worker, estimated_seconds = secs, "Waiting for a new session");
            })
            .await;

        match acquired {
            Ok(session) => {
                tally.served += 1;
                if waited {
                    tally.served_after_creation += 1;
                }
                session.send(format!("hello from {context_id}"));
                tokio::time::sleep(hold).await;
                pool.release(session);
            }
            Err(PoolError::Exhausted { .. }) => {
                tally.exhausted += 1;
                tokio::time::sleep(hold / 2).await;
            }
            Err(e) => {
                tally.failed += 1;
                debug!(worker, error = %e, "Acquire failed");
            }
        }
    }

    tally
}

pub async fn execute(args: SimulateArgs, config: AppConfig, format: OutputFormat) -> Result<()> {
    let mut pool_config = config.pool;
    if let Some(max_size) = args.max_size {
        pool_config.max_size = max_size;
    }
    if let Some(keep_idle) = args.keep_idle {
        pool_config.keep_idle_size = keep_idle;
    }
    if let Some(initial) = args.initial {
        pool_config.initial_size = initial;
    }

    let factory = SimulatedFactory::new(
        Duration::from_millis(args.connect_ms),
        args.fail_every,
        args.max_uses,
    );

    info!(workers = args.workers, iterations = args.iterations, "Starting simulation");
    let started = Instant::now();

    let pool = Arc::new(
        SessionPool::start(pool_config, factory)
            .await
            .context("Failed to start session pool")?,
    );

    let mut events = pool.subscribe();
    let event_counter = tokio::spawn(async move {
        let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();
        loop {
            match events.recv().await {
                Ok(event) => *counts.entry(event.kind()).or_default() += 1,
                Err(RecvError::Lagged(missed)) => {
                    *counts.entry("lagged").or_default() += missed;
                }
                Err(RecvError::Closed) => break,
            }
        }
        counts
    });

    let hold = Duration::from_millis(args.hold_ms);
    let workers = (0..args.workers).map(|worker| {
        tokio::spawn(run_worker(Arc::clone(&pool), worker, args.iterations, hold))
    });

    let mut tally = WorkerTally::default();
    for result in join_all(workers).await {
        tally.merge(result.context("Worker task panicked")?);
    }

    let stats = pool.stats();
    pool.shutdown().await.context("Failed to shut down pool")?;
    // Dropping the last handle closes the event channel
    drop(pool);
    let events = event_counter.await.context("Event counter panicked")?;

    let report = SimulationReport {
        workers: args.workers,
        iterations: args.iterations,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        tally,
        events,
        stats,
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?
            );
        }
        OutputFormat::Text => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &SimulationReport) {
    let stats = &report.stats;

    println!(
        "Simulated {} workers x {} iterations in {} ms",
        report.workers, report.iterations, report.elapsed_ms
    );
    println!();
    println!("  Served:            {}", report.tally.served);
    println!("  After creation:    {}", report.tally.served_after_creation);
    println!("  Exhausted:         {}", report.tally.exhausted);
    println!("  Failed:            {}", report.tally.failed);
    println!();
    println!(
        "  Pool at end:       {} total ({} idle, {} active, {} reserved) of max {}",
        stats.total, stats.idle, stats.active, stats.reserved, stats.max_size
    );
    println!("  Creation failures: {}", stats.creation_failures_total);
    println!("  Reclaimed:         {}", stats.reclaimed_total);
    println!("  Evicted:           {}", stats.evicted_total);
    if let Some(mean) = stats.mean_acquire_latency_ms() {
        println!("  Mean acquire:      {mean:.1} ms");
    }

    if !report.events.is_empty() {
        println!();
        println!("  Events:");
        for (kind, count) in &report.events {
            println!("    {kind:<24} {count}");
        }
    }
}
