//! Metrics hooks for pool observability
//!
//! The controller never touches a global registry. Collaborators that want
//! `running_workers{pool}` and `worker_failures{pool}` implement
//! [`PoolMetrics`] and inject it into the launcher and the supervisor.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Gauge/counter hooks around the worker lifecycle
pub trait PoolMetrics: Send + Sync {
    /// Gauge `running_workers{pool}` +1
    fn worker_started(&self, pool: &str);

    /// Gauge `running_workers{pool}` -1, exactly once per started worker
    fn worker_stopped(&self, pool: &str);

    /// Counter `worker_failures{pool}` +1
    fn worker_failed(&self, pool: &str);
}

/// Metrics sink that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl PoolMetrics for NoopMetrics {
    fn worker_started(&self, _pool: &str) {}
    fn worker_stopped(&self, _pool: &str) {}
    fn worker_failed(&self, _pool: &str) {}
}

#[derive(Debug, Default)]
struct Counters {
    running: AtomicI64,
    started: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of one pool's metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounters {
    pub running_workers: i64,
    pub workers_started: u64,
    pub worker_failures: u64,
}

/// In-process metrics keyed by pool name.
///
/// Uses atomic counters per pool, so hooks never take a lock on the hot path
/// once the pool entry exists.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    pools: DashMap<String, Counters>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_counters(&self, pool: &str, f: impl FnOnce(&Counters)) {
        if let Some(counters) = self.pools.get(pool) {
            f(&counters);
            return;
        }
        let counters = self.pools.entry(pool.to_string()).or_default();
        f(&counters);
    }

    /// Snapshot the counters of `pool` (zeroes if never seen)
    pub fn snapshot(&self, pool: &str) -> PoolCounters {
        self.pools
            .get(pool)
            .map(|c| PoolCounters {
                running_workers: c.running.load(Ordering::SeqCst),
                workers_started: c.started.load(Ordering::SeqCst),
                worker_failures: c.failures.load(Ordering::SeqCst),
            })
            .unwrap_or_default()
    }

    pub fn running_workers(&self, pool: &str) -> i64 {
        self.snapshot(pool).running_workers
    }

    pub fn worker_failures(&self, pool: &str) -> u64 {
        self.snapshot(pool).worker_failures
    }
}

impl PoolMetrics for InMemoryMetrics {
    fn worker_started(&self, pool: &str) {
        self.with_counters(pool, |c| {
            c.running.fetch_add(1, Ordering::SeqCst);
            c.started.fetch_add(1, Ordering::SeqCst);
        });
    }

    fn worker_stopped(&self, pool: &str) {
        self.with_counters(pool, |c| {
            c.running.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn worker_failed(&self, pool: &str) {
        self.with_counters(pool, |c| {
            c.failures.fetch_add(1, Ordering::SeqCst);
        });
    }
}

/// Keeps the running gauge raised for the lifetime of one worker execution.
///
/// Created on launch; moved into the execution so the decrement happens
/// exactly once when the execution ends, however it ends (completion,
/// cancellation, panic or abort).
pub struct RunningGuard {
    metrics: Arc<dyn PoolMetrics>,
    pool: String,
}

impl RunningGuard {
    pub fn new(metrics: Arc<dyn PoolMetrics>, pool: impl Into<String>) -> Self {
        let pool = pool.into();
        metrics.worker_started(&pool);
        Self { metrics, pool }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.metrics.worker_stopped(&self.pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_balances_gauge() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let guard = RunningGuard::new(metrics.clone(), "ingest");
        let second = RunningGuard::new(metrics.clone(), "ingest");
        assert_eq!(metrics.running_workers("ingest"), 2);

        drop(guard);
        assert_eq!(metrics.running_workers("ingest"), 1);
        drop(second);

        let snapshot = metrics.snapshot("ingest");
        assert_eq!(snapshot.running_workers, 0);
        assert_eq!(snapshot.workers_started, 2);
    }

    #[test]
    fn test_pools_are_tracked_separately() {
        let metrics = InMemoryMetrics::new();
        metrics.worker_failed("a");
        metrics.worker_failed("a");
        metrics.worker_failed("b");

        assert_eq!(metrics.worker_failures("a"), 2);
        assert_eq!(metrics.worker_failures("b"), 1);
        assert_eq!(metrics.snapshot("unknown"), PoolCounters::default());
    }
}
