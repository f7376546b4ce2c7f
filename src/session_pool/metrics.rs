// ABOUTME: Metrics and stats snapshots for the agent session pool
//
// Tracks:
// - Acquisitions: total, on-demand creations, fail-fast rejections
// - Maintenance: creation failures, idle reclamations, health evictions
// - Recent acquisition latencies (bounded ring)
//
// PoolStats is always recomputed from pool state plus these counters; it is
// never a source of truth.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Pool-level counters
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Sessions handed to callers, idle hits and on-demand creations alike
    pub acquisitions_total: AtomicU64,
    /// Acquisitions that had to create a session
    pub on_demand_creations_total: AtomicU64,
    /// Acquisitions refused with `Exhausted`
    pub exhausted_total: AtomicU64,
    /// Failed connects, background or on-demand
    pub creation_failures_total: AtomicU64,
    /// Idle sessions reclaimed by the reaper
    pub reclaimed_total: AtomicU64,
    /// Idle sessions evicted by the health checker
    pub evicted_total: AtomicU64,
    latencies: Mutex<VecDeque<Duration>>,
    latency_capacity: usize,
}

impl PoolMetrics {
    /// Create zeroed counters keeping at most `latency_capacity` samples
    #[must_use]
    pub fn new(latency_capacity: usize) -> Self {
        Self {
            latencies: Mutex::new(VecDeque::with_capacity(latency_capacity)),
            latency_capacity,
            ..Self::default()
        }
    }

    /// Record a successful acquisition and how long the caller waited
    pub fn record_acquisition(&self, latency: Duration) {
        self.acquisitions_total.fetch_add(1, Ordering::Relaxed);
        if self.latency_capacity == 0 {
            return;
        }
        let mut samples = self.latencies.lock();
        if samples.len() == self.latency_capacity {
            samples.pop_front();
        }
        samples.push_back(latency);
    }

    /// Count an acquisition that creates its session
    pub fn record_on_demand_creation(&self) {
        self.on_demand_creations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a fail-fast rejection
    pub fn record_exhausted(&self) {
        self.exhausted_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed session creation
    pub fn record_creation_failure(&self) {
        self.creation_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an idle session reclaimed past its timeout
    pub fn record_reclaimed(&self) {
        self.reclaimed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an idle session evicted as unhealthy
    pub fn record_evicted(&self) {
        self.evicted_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Recent latencies in milliseconds, oldest first
    pub fn recent_latencies_ms(&self) -> Vec<f64> {
        self.latencies
            .lock()
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect()
    }
}

/// Point-in-time, read-only view of the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    /// idle + active + reserved
    pub total: usize,
    /// Sessions ready to serve
    pub idle: usize,
    /// Sessions checked out
    pub active: usize,
    /// Creations in flight
    pub reserved: usize,

    /// Configured hard cap
    pub max_size: usize,
    /// Configured idle floor
    pub keep_idle_size: usize,
    /// Configured startup size
    pub initial_size: usize,

    /// See [`PoolMetrics::acquisitions_total`]
    pub acquisitions_total: u64,
    /// See [`PoolMetrics::on_demand_creations_total`]
    pub on_demand_creations_total: u64,
    /// See [`PoolMetrics::exhausted_total`]
    pub exhausted_total: u64,
    /// See [`PoolMetrics::creation_failures_total`]
    pub creation_failures_total: u64,
    /// See [`PoolMetrics::reclaimed_total`]
    pub reclaimed_total: u64,
    /// See [`PoolMetrics::evicted_total`]
    pub evicted_total: u64,

    /// Recent acquisition latencies in milliseconds, oldest first
    pub recent_acquire_latencies_ms: Vec<f64>,

    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl PoolStats {
    /// Fraction of the hard cap currently checked out
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.active as f64 / self.max_size as f64;
        ratio
    }

    /// Mean of the recent latency samples, if any
    #[must_use]
    pub fn mean_acquire_latency_ms(&self) -> Option<f64> {
        if self.recent_acquire_latencies_ms.is_empty() {
            return None;
        }
        let sum: f64 = self.recent_acquire_latencies_ms.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / self.recent_acquire_latencies_ms.len() as f64;
        Some(mean)
    }
}
