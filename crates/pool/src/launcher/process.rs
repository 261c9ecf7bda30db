//! OS process launcher

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::WorkerLauncher;
use crate::config::WorkerConfig;
use crate::error::LaunchError;
use crate::handle::{WorkerHandle, WorkerId};
use crate::metrics::{NoopMetrics, PoolMetrics, RunningGuard};
use crate::outcome::Outcome;

/// Exit code a worker process uses to ask for another run (EX_TEMPFAIL)
pub const DEFAULT_MORE_WORK_EXIT_CODE: i32 = 75;

/// Command run for every replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLauncherConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Exit code mapped to `Success { more_work: true }`
    #[serde(default = "default_more_work_exit_code")]
    pub more_work_exit_code: i32,
}

fn default_more_work_exit_code() -> i32 {
    DEFAULT_MORE_WORK_EXIT_CODE
}

impl ProcessLauncherConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            more_work_exit_code: DEFAULT_MORE_WORK_EXIT_CODE,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_more_work_exit_code(mut self, code: i32) -> Self {
        self.more_work_exit_code = code;
        self
    }

    /// Map a process exit status to a worker outcome
    pub fn classify(&self, status: ExitStatus) -> Outcome {
        match status.code() {
            Some(0) => Outcome::success(false),
            Some(code) if code == self.more_work_exit_code => Outcome::success(true),
            Some(code) => Outcome::failure(format!("worker exited with code {code}")),
            None => Outcome::failure("worker terminated by signal"),
        }
    }
}

/// Launches each replica as a child process.
///
/// The child receives `ELASTIC_POOL_WORKER_ID`, `ELASTIC_POOL_NAME` and
/// `ELASTIC_POOL_SETTINGS` (JSON) in its environment. Cancelling the handle
/// kills the child and waits for it to exit.
pub struct ProcessLauncher {
    config: ProcessLauncherConfig,
    metrics: Arc<dyn PoolMetrics>,
}

impl ProcessLauncher {
    pub fn new(config: ProcessLauncherConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report the running gauge to `metrics`
    pub fn with_metrics(mut self, metrics: Arc<dyn PoolMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ProcessLauncherConfig {
        &self.config
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, config: &WorkerConfig) -> Result<WorkerHandle, LaunchError> {
        let id = WorkerId::new();

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .env("ELASTIC_POOL_WORKER_ID", id.to_string())
            .env("ELASTIC_POOL_NAME", &config.pool)
            .env("ELASTIC_POOL_SETTINGS", config.settings.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        debug!(
            worker_id = %id,
            pool = %config.pool,
            pid = ?child.id(),
            program = %self.config.program,
            "Launched worker process"
        );

        let guard = RunningGuard::new(Arc::clone(&self.metrics), config.pool.clone());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let process = self.config.clone();

        let join = tokio::spawn(async move {
            let _guard = guard;
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => process.classify(status),
                    Err(e) => Outcome::failure(format!("failed to wait for worker process: {e}")),
                },
                _ = token.cancelled() => {
                    if let Err(e) = child.kill().await {
                        warn!(worker_id = %id, error = %e, "Failed to kill worker process");
                    }
                    Outcome::Cancelled
                }
            }
        });

        Ok(WorkerHandle::new(id, cancel, join))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::metrics::InMemoryMetrics;
    use std::os::unix::process::ExitStatusExt;

    fn sh(script: &str) -> ProcessLauncherConfig {
        ProcessLauncherConfig::new("sh").with_args(["-c", script])
    }

    #[test]
    fn test_classify_exit_codes() {
        let config = ProcessLauncherConfig::new("worker");
        assert_eq!(
            config.classify(ExitStatus::from_raw(0)),
            Outcome::success(false)
        );
        assert_eq!(
            config.classify(ExitStatus::from_raw(75 << 8)),
            Outcome::success(true)
        );
        assert!(config.classify(ExitStatus::from_raw(1 << 8)).is_failure());
        // Killed by SIGKILL
        assert!(config.classify(ExitStatus::from_raw(9)).is_failure());
    }

    #[tokio::test]
    async fn test_process_exit_codes_map_to_outcomes() {
        let launcher = ProcessLauncher::new(sh("exit 75"));
        let mut handle = launcher.launch(&WorkerConfig::new("proc")).unwrap();
        assert_eq!(handle.join().await, Outcome::success(true));

        let launcher = ProcessLauncher::new(sh("exit 3"));
        let mut handle = launcher.launch(&WorkerConfig::new("proc")).unwrap();
        assert!(handle.join().await.is_failure());
    }

    #[tokio::test]
    async fn test_worker_sees_pool_environment() {
        let launcher = ProcessLauncher::new(sh(r#"test "$ELASTIC_POOL_NAME" = "envcheck""#));
        let mut handle = launcher.launch(&WorkerConfig::new("envcheck")).unwrap();
        assert_eq!(handle.join().await, Outcome::success(false));
    }

    #[tokio::test]
    async fn test_cancel_kills_process() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let launcher = ProcessLauncher::new(sh("sleep 30")).with_metrics(metrics.clone());
        let mut handle = launcher.launch(&WorkerConfig::new("kill")).unwrap();
        assert_eq!(metrics.running_workers("kill"), 1);

        handle.cancel();
        assert_eq!(handle.join().await, Outcome::Cancelled);
        assert_eq!(metrics.running_workers("kill"), 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_a_launch_error() {
        let launcher = ProcessLauncher::new(ProcessLauncherConfig::new(
            "/nonexistent/elastic-pool-worker",
        ));
        let err = launcher.launch(&WorkerConfig::new("missing")).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn(_)));
    }
}
