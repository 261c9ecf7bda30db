// Simulate command: synthetic in-process workers
//
// Useful for trying out scaling and backoff behaviour without a real job.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use elastic_pool::{
    InMemoryMetrics, PoolConfig, PoolMetrics, PoolSupervisor, TaskLauncher, Worker,
    WorkerContext, WorkerError,
};
use tracing::debug;

use crate::output::OutputFormat;

/// Worker that sleeps for a fixed time per execution.
///
/// The first `rounds` executions across the pool report more work; every
/// `fail_every`-th execution fails instead.
pub struct SimulatedWorker {
    work: Duration,
    rounds: u32,
    fail_every: Option<u32>,
    executions: AtomicU32,
}

impl SimulatedWorker {
    pub fn new(work: Duration, rounds: u32, fail_every: Option<u32>) -> Self {
        Self {
            work,
            rounds,
            fail_every: fail_every.filter(|n| *n > 0),
            executions: AtomicU32::new(0),
        }
    }

    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for SimulatedWorker {
    async fn run(&self, ctx: WorkerContext) -> Result<bool, WorkerError> {
        let execution = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(worker_id = %ctx.id, execution, "Simulated execution started");

        tokio::select! {
            _ = tokio::time::sleep(self.work) => {}
            _ = ctx.cancelled() => {
                debug!(worker_id = %ctx.id, execution, "Simulated execution interrupted");
                return Ok(false);
            }
        }

        if self.fail_every.is_some_and(|n| execution % n == 0) {
            return Err(WorkerError::new(format!(
                "simulated failure on execution {execution}"
            )));
        }
        Ok(execution <= self.rounds)
    }
}

pub async fn run(
    config: PoolConfig,
    format: OutputFormat,
    control: bool,
    work_ms: u64,
    rounds: u32,
    fail_every: Option<u32>,
) -> Result<()> {
    let metrics = Arc::new(InMemoryMetrics::new());
    let worker = SimulatedWorker::new(Duration::from_millis(work_ms), rounds, fail_every);
    let launcher =
        TaskLauncher::new(worker).with_metrics(Arc::clone(&metrics) as Arc<dyn PoolMetrics>);

    let supervisor = PoolSupervisor::new(config, Arc::new(launcher))
        .with_metrics(Arc::clone(&metrics) as Arc<dyn PoolMetrics>);

    super::drive(Arc::new(supervisor), metrics, format, control).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_pool_runs_out_of_work() {
        let worker = Arc::new(SimulatedWorker::new(Duration::from_millis(100), 4, None));
        let supervisor = PoolSupervisor::new(
            PoolConfig::new("sim").with_replicas(2),
            Arc::new(TaskLauncher::new(SharedWorker(Arc::clone(&worker)))),
        );

        let result = supervisor.run().await.unwrap();

        // Executions 1..=4 ask for more work and are each replaced once
        assert_eq!(worker.executions(), 6);
        assert_eq!(result.len(), 6);
        assert_eq!(result.successes(), 6);
        assert_eq!(result.outcomes().filter(|o| o.wants_more_work()).count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_failures_are_retried() {
        let worker = Arc::new(SimulatedWorker::new(Duration::from_millis(10), 0, Some(1)));
        let supervisor = Arc::new(PoolSupervisor::new(
            PoolConfig::new("sim")
                .with_replicas(1)
                .with_failure_backoff(Duration::from_secs(1)),
            Arc::new(TaskLauncher::new(SharedWorker(Arc::clone(&worker)))),
        ));

        let runner = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.run().await })
        };
        tokio::time::sleep(Duration::from_millis(2500)).await;
        supervisor.stop().unwrap();
        let result = runner.await.unwrap().unwrap();

        // Failures at ~10ms, ~1020ms and ~2030ms; stop lands in the last backoff
        assert_eq!(result.failures(), 3);
        assert_eq!(result.cancelled(), 0);
        assert_eq!(worker.executions(), 3);
    }

    /// Lets a test keep a handle on the worker it hands to the launcher
    struct SharedWorker(Arc<SimulatedWorker>);

    #[async_trait]
    impl Worker for SharedWorker {
        async fn run(&self, ctx: WorkerContext) -> Result<bool, WorkerError> {
            self.0.run(ctx).await
        }
    }
}
