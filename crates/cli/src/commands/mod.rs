// Pool-driving commands

pub mod run;
pub mod simulate;

use std::sync::Arc;

use anyhow::{Context, Result};
use elastic_pool::{InMemoryMetrics, PoolError, PoolSupervisor, RunResult};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::control;
use crate::output::{self, OutputFormat, RunReport};

/// Run `supervisor` to completion, wiring up stdin control and Ctrl-C.
///
/// Prints the run report (or the partial report of an aborted run) once the
/// pool has stopped.
pub async fn drive(
    supervisor: Arc<PoolSupervisor>,
    metrics: Arc<InMemoryMetrics>,
    format: OutputFormat,
    control: bool,
) -> Result<()> {
    let pool = supervisor.config().name.clone();
    info!(
        pool = %pool,
        replicas = supervisor.config().replicas,
        backoff_ms = supervisor.config().failure_backoff.as_millis() as u64,
        "Starting pool"
    );

    let mut runner: JoinHandle<Result<RunResult, PoolError>> = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.run().await })
    };

    let listener = control.then(|| {
        tokio::spawn(control::listen(
            Arc::clone(&supervisor),
            control::spawn_stdin_reader(),
            format,
        ))
    });

    let joined = tokio::select! {
        joined = &mut runner => joined,
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping pool");
            if let Err(e) = supervisor.stop() {
                warn!(error = %e, "Stop request was not applied");
            }
            runner.await
        }
    };

    if let Some(listener) = listener {
        listener.abort();
    }

    let counters = metrics.snapshot(&pool);
    info!(
        pool = %pool,
        workers_started = counters.workers_started,
        worker_failures = counters.worker_failures,
        "Pool stopped"
    );

    match joined.context("Pool supervisor task failed")? {
        Ok(result) => output::print_report(format, &RunReport::new(&pool, &result)),
        Err(err) => {
            if let Some(partial) = err.partial_result() {
                output::print_report(
                    format,
                    &RunReport::new(&pool, partial).aborted(err.to_string()),
                )?;
            }
            Err(err).context("Pool run failed")
        }
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
