//! Pool supervisor: the reconciliation run loop
//!
//! The supervisor owns the set of running worker handles. `run()` launches
//! the initial replicas, then blocks until either a worker completes or the
//! [`ScaleController`] signals a change, reconciles, and waits again. It
//! returns once the pool is inactive and empty, or once every worker has
//! finished without asking for more work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Poll;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::PoolConfig;
use crate::controller::{DesiredState, ScaleController};
use crate::error::{LaunchError, PoolError};
use crate::handle::WorkerHandle;
use crate::launcher::WorkerLauncher;
use crate::metrics::{NoopMetrics, PoolMetrics};
use crate::outcome::{Outcome, RunResult};

/// Lifecycle of a supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// `run()` has not been called yet
    Idle,
    /// Launching and replacing workers
    Running,
    /// Inactive; waiting for outstanding workers, launching nothing
    Draining,
    /// `run()` has returned
    Stopped,
}

/// Point-in-time view of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub status: PoolStatus,
    pub desired: DesiredState,
    pub running: usize,
}

enum Event {
    Rescale,
    Completed(usize),
}

/// Handles and outcomes owned by one `run()` invocation
#[derive(Default)]
struct RunState {
    running: Vec<WorkerHandle>,
    results: RunResult,
}

/// Keeps a pool of interchangeable worker replicas at its desired size
///
/// # Example
///
/// ```ignore
/// use elastic_pool::{PoolConfig, PoolSupervisor, TaskLauncher, worker_fn};
///
/// let launcher = TaskLauncher::new(worker_fn(|ctx| async move {
///     // process one batch...
///     Ok(true)
/// }));
/// let supervisor = Arc::new(PoolSupervisor::new(
///     PoolConfig::new("alerts").with_replicas(3),
///     Arc::new(launcher),
/// ));
///
/// let controller = supervisor.controller();
/// tokio::spawn(async move {
///     controller.scale(5)?;
///     // ...
///     controller.stop()
/// });
///
/// let result = supervisor.run().await?;
/// ```
pub struct PoolSupervisor {
    config: PoolConfig,
    launcher: Arc<dyn WorkerLauncher>,
    metrics: Arc<dyn PoolMetrics>,
    controller: Arc<ScaleController>,
    status: RwLock<PoolStatus>,
    running: AtomicUsize,
}

impl PoolSupervisor {
    pub fn new(config: PoolConfig, launcher: Arc<dyn WorkerLauncher>) -> Self {
        let controller = Arc::new(ScaleController::new(config.replicas));
        Self {
            config,
            launcher,
            metrics: Arc::new(NoopMetrics),
            controller,
            status: RwLock::new(PoolStatus::Idle),
            running: AtomicUsize::new(0),
        }
    }

    /// Report worker failures to `metrics`
    pub fn with_metrics(mut self, metrics: Arc<dyn PoolMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Shared controller for callers on other tasks or threads
    pub fn controller(&self) -> Arc<ScaleController> {
        Arc::clone(&self.controller)
    }

    pub fn scale(&self, replicas: i64) -> Result<(), PoolError> {
        self.controller.scale(replicas)
    }

    pub fn stop(&self) -> Result<(), PoolError> {
        self.controller.stop()
    }

    pub fn drain(&self) -> Result<(), PoolError> {
        self.controller.drain()
    }

    pub fn status(&self) -> PoolStatus {
        *self.status.read()
    }

    /// Workers running after the last reconciliation step
    pub fn running_workers(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            status: self.status(),
            desired: self.controller.desired(),
            running: self.running_workers(),
        }
    }

    /// Run the pool until it is stopped and empty, or exhausted.
    ///
    /// Worker failures never end the run; they are counted, backed off and
    /// replaced. A launcher error aborts the run: every outstanding worker
    /// is cancelled and joined, and the partial result is returned inside
    /// [`PoolError::Aborted`].
    #[instrument(skip(self), fields(pool = %self.config.name))]
    pub async fn run(&self) -> Result<RunResult, PoolError> {
        self.enter()?;

        let mut state = RunState::default();
        let driven = self.drive(&mut state).await;

        match driven {
            Ok(()) => {
                self.join_all(&mut state).await;
                self.set_status(PoolStatus::Stopped);
                let summary = state.results.summary();
                info!(
                    total = summary.total,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    cancelled = summary.cancelled,
                    "Pool stopped"
                );
                Ok(state.results)
            }
            Err(source) => {
                error!(error = %source, running = state.running.len(), "Reconciliation failed, aborting pool");
                for handle in &state.running {
                    handle.cancel();
                }
                self.join_all(&mut state).await;
                self.set_status(PoolStatus::Stopped);
                Err(PoolError::Aborted {
                    source,
                    partial: state.results,
                })
            }
        }
    }

    fn enter(&self) -> Result<(), PoolError> {
        let mut status = self.status.write();
        match *status {
            PoolStatus::Idle => {
                *status = PoolStatus::Running;
                self.controller.mark_started();
                Ok(())
            }
            PoolStatus::Stopped => Err(PoolError::AlreadyStopped),
            PoolStatus::Running | PoolStatus::Draining => Err(PoolError::AlreadyRunning),
        }
    }

    async fn drive(&self, state: &mut RunState) -> Result<(), LaunchError> {
        let desired = self.controller.desired();
        if desired.active {
            info!(replicas = desired.replicas, "Starting pool");
            for _ in 0..desired.replicas {
                self.launch(state)?;
            }
        }
        self.publish(state);

        loop {
            let desired = self.controller.desired();
            if !desired.active {
                self.begin_draining();
                if state.running.is_empty() {
                    break;
                }
            }

            match self.next_event(state).await {
                Event::Rescale => self.rescale(state).await?,
                Event::Completed(index) => {
                    let relaunched = self.on_completion(state, index).await?;
                    if !relaunched && state.running.is_empty() && self.controller.is_active() {
                        info!("All workers finished without requesting more work");
                        break;
                    }
                }
            }
            self.publish(state);
        }

        Ok(())
    }

    /// Wait for a rescale signal or the first worker to complete
    async fn next_event(&self, state: &mut RunState) -> Event {
        let running = &mut state.running;
        let completion = futures::future::poll_fn(|cx| {
            for (index, handle) in running.iter_mut().enumerate() {
                if handle.poll_join(cx).is_ready() {
                    return Poll::Ready(index);
                }
            }
            Poll::Pending
        });

        tokio::select! {
            biased;
            _ = self.controller.changed() => Event::Rescale,
            index = completion => Event::Completed(index),
        }
    }

    /// Reconcile the running set with the desired state.
    ///
    /// Every cancellation is issued before any is joined, and all of them are
    /// joined before the step returns.
    async fn rescale(&self, state: &mut RunState) -> Result<(), LaunchError> {
        let desired = self.controller.desired();
        let running = state.running.len();

        if running > desired.replicas {
            info!(running, replicas = desired.replicas, "Scaling down");
            // Newest workers go first
            let victims = state.running.split_off(desired.replicas);
            for handle in &victims {
                handle.cancel();
            }
            for mut handle in victims {
                let outcome = handle.join().await;
                self.record(state, &handle, outcome);
            }
        } else if running < desired.replicas && desired.active {
            info!(running, replicas = desired.replicas, "Scaling up");
            for _ in running..desired.replicas {
                self.launch(state)?;
            }
        } else {
            debug!(running, replicas = desired.replicas, active = desired.active, "Nothing to reconcile");
        }

        Ok(())
    }

    /// Handle a finished worker; returns whether a replacement was launched
    async fn on_completion(&self, state: &mut RunState, index: usize) -> Result<bool, LaunchError> {
        let mut handle = state.running.remove(index);
        let outcome = handle.join().await;
        self.record(state, &handle, outcome.clone());

        let replace = match outcome {
            Outcome::Failure(_) => {
                tokio::time::sleep(self.config.failure_backoff).await;
                true
            }
            Outcome::Success { more_work } => more_work,
            Outcome::Cancelled => false,
        };
        if !replace {
            return Ok(false);
        }

        // One replica of slack: a replacement may start while the others are
        // already at the target, a pending rescale trims the excess
        let desired = self.controller.desired();
        if desired.active && state.running.len() <= desired.replicas {
            self.launch(state)?;
            Ok(true)
        } else {
            debug!(
                running = state.running.len(),
                replicas = desired.replicas,
                active = desired.active,
                "Not replacing worker"
            );
            Ok(false)
        }
    }

    fn launch(&self, state: &mut RunState) -> Result<(), LaunchError> {
        let handle = self.launcher.launch(&self.config.worker)?;
        debug!(worker_id = %handle.id(), running = state.running.len() + 1, "Worker launched");
        state.running.push(handle);
        Ok(())
    }

    fn record(&self, state: &mut RunState, handle: &WorkerHandle, outcome: Outcome) {
        match &outcome {
            Outcome::Failure(e) => {
                error!(worker_id = %handle.id(), error = %e, "Worker failed");
                self.metrics.worker_failed(&self.config.name);
            }
            Outcome::Success { more_work } => {
                debug!(worker_id = %handle.id(), more_work, "Worker finished");
            }
            Outcome::Cancelled => {
                debug!(worker_id = %handle.id(), "Worker cancelled");
            }
        }
        state.results.record(handle.id(), handle.started_at(), outcome);
    }

    /// Join every outstanding handle, recording its outcome
    async fn join_all(&self, state: &mut RunState) {
        let outstanding = std::mem::take(&mut state.running);
        if !outstanding.is_empty() {
            warn!(count = outstanding.len(), "Joining outstanding workers");
        }
        for mut handle in outstanding {
            let outcome = handle.join().await;
            self.record(state, &handle, outcome);
        }
        self.publish(state);
    }

    fn begin_draining(&self) {
        let mut status = self.status.write();
        if *status == PoolStatus::Running {
            info!("Pool inactive, draining");
            *status = PoolStatus::Draining;
        }
    }

    fn set_status(&self, status: PoolStatus) {
        *self.status.write() = status;
    }

    fn publish(&self, state: &RunState) {
        self.running.store(state.running.len(), Ordering::SeqCst);
    }
}
