//! In-process task launcher

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::WorkerLauncher;
use crate::config::WorkerConfig;
use crate::error::{LaunchError, WorkerError};
use crate::handle::{WorkerHandle, WorkerId};
use crate::metrics::{NoopMetrics, PoolMetrics, RunningGuard};
use crate::outcome::Outcome;

/// Everything a worker execution gets to see
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub id: WorkerId,
    pub pool: String,
    pub settings: serde_json::Value,
    cancellation: CancellationToken,
}

impl WorkerContext {
    /// True once the supervisor asked this worker to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the supervisor asks this worker to stop
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// Business logic of one replica.
///
/// Returns `Ok(true)` when more work remains and the pool should drive the
/// job again, `Ok(false)` when this replica is done.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn run(&self, ctx: WorkerContext) -> Result<bool, WorkerError>;
}

/// [`Worker`] backed by an async closure, see [`worker_fn`]
pub struct FnWorker<F> {
    f: F,
}

/// Build a [`Worker`] from an async closure
pub fn worker_fn<F, Fut>(f: F) -> FnWorker<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, WorkerError>> + Send + 'static,
{
    FnWorker { f }
}

#[async_trait]
impl<F, Fut> Worker for FnWorker<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, WorkerError>> + Send + 'static,
{
    async fn run(&self, ctx: WorkerContext) -> Result<bool, WorkerError> {
        (self.f)(ctx).await
    }
}

/// Launches each replica as a tokio task running the same [`Worker`].
///
/// Workers are expected to watch [`WorkerContext::cancelled`] and return;
/// set a cancel grace to drop workers that do not.
pub struct TaskLauncher {
    worker: Arc<dyn Worker>,
    metrics: Arc<dyn PoolMetrics>,
    cancel_grace: Option<Duration>,
}

impl TaskLauncher {
    pub fn new(worker: impl Worker) -> Self {
        Self {
            worker: Arc::new(worker),
            metrics: Arc::new(NoopMetrics),
            cancel_grace: None,
        }
    }

    /// Report the running gauge to `metrics`
    pub fn with_metrics(mut self, metrics: Arc<dyn PoolMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Drop workers still running `grace` after they were cancelled
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = Some(grace);
        self
    }
}

impl WorkerLauncher for TaskLauncher {
    fn launch(&self, config: &WorkerConfig) -> Result<WorkerHandle, LaunchError> {
        let id = WorkerId::new();
        let cancel = CancellationToken::new();
        let ctx = WorkerContext {
            id,
            pool: config.pool.clone(),
            settings: config.settings.clone(),
            cancellation: cancel.clone(),
        };
        let worker = Arc::clone(&self.worker);
        let guard = RunningGuard::new(Arc::clone(&self.metrics), config.pool.clone());

        debug!(worker_id = %id, pool = %config.pool, "Launching task worker");

        let execution = async move {
            let _guard = guard;
            match worker.run(ctx).await {
                Ok(more_work) => Outcome::success(more_work),
                Err(error) => Outcome::Failure(error),
            }
        };

        Ok(match self.cancel_grace {
            Some(grace) => WorkerHandle::spawn_with_grace(id, cancel, grace, execution),
            None => WorkerHandle::spawn(id, cancel, execution),
        })
    }
}
