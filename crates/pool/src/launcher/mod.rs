//! Worker launchers
//!
//! The supervisor never spawns anything itself. It asks a [`WorkerLauncher`]
//! for a new replica and gets back a [`WorkerHandle`](crate::WorkerHandle).
//!
//! - [`TaskLauncher`] - runs a [`Worker`] implementation as a tokio task
//! - [`ProcessLauncher`] - runs one OS process per replica
//!
//! Launchers raise the `running_workers{pool}` gauge when a worker starts and
//! lower it exactly once when the worker ends, through a
//! [`RunningGuard`](crate::metrics::RunningGuard) moved into the execution.

mod process;
mod task;

pub use process::{ProcessLauncher, ProcessLauncherConfig, DEFAULT_MORE_WORK_EXIT_CODE};
pub use task::{worker_fn, FnWorker, TaskLauncher, Worker, WorkerContext};

use crate::config::WorkerConfig;
use crate::error::LaunchError;
use crate::handle::WorkerHandle;

/// Starts worker replicas
pub trait WorkerLauncher: Send + Sync {
    /// Start one replica and return immediately.
    ///
    /// Must not block past accepting the launch; the returned handle is
    /// awaited later by the supervisor.
    fn launch(&self, config: &WorkerConfig) -> Result<WorkerHandle, LaunchError>;
}

impl<L: WorkerLauncher + ?Sized> WorkerLauncher for std::sync::Arc<L> {
    fn launch(&self, config: &WorkerConfig) -> Result<WorkerHandle, LaunchError> {
        (**self).launch(config)
    }
}
