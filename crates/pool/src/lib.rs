//! # Elastic Pool
//!
//! An in-process controller that keeps a configurable number of
//! interchangeable worker replicas alive for one logical job.
//!
//! ## Features
//!
//! - **Live rescaling**: `scale(n)` from any task or thread; the run loop
//!   launches the deficit or cancels and joins the excess
//! - **Self-driven restarts**: a worker that reports more work is replaced
//!   immediately, a failed worker is replaced after a fixed backoff
//! - **Clean shutdown**: `stop()` cancels and joins every worker, `drain()`
//!   lets running workers finish without replacing them
//! - **Pluggable execution**: tokio tasks or OS processes behind the
//!   [`WorkerLauncher`] trait
//! - **Injected metrics**: `running_workers{pool}` and `worker_failures{pool}`
//!   through [`PoolMetrics`]
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  scale / stop / drain   ┌─────────────────────────┐
//! │  Caller threads  │ ──────────────────────▶ │     ScaleController     │
//! └──────────────────┘                         │ (desired state + wake)  │
//!                                              └────────────┬────────────┘
//!                                                           │ signal
//!                                                           ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           PoolSupervisor                            │
//! │  wait(any worker done | rescale) → reconcile → record outcome       │
//! └───────────────┬──────────────────────────────────────┬──────────────┘
//!                 │ launch                               │ join / cancel
//!                 ▼                                      ▼
//! ┌──────────────────────────────┐        ┌─────────────────────────────┐
//! │        WorkerLauncher        │ ─────▶ │  WorkerHandle (per replica) │
//! │ (TaskLauncher, Process...)   │        └─────────────────────────────┘
//! └──────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod handle;
pub mod launcher;
pub mod metrics;
pub mod outcome;
pub mod supervisor;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{PoolConfig, WorkerConfig};
    pub use crate::controller::{DesiredState, ScaleController};
    pub use crate::error::{LaunchError, PoolError, WorkerError};
    pub use crate::handle::{WorkerHandle, WorkerId};
    pub use crate::launcher::{
        worker_fn, ProcessLauncher, ProcessLauncherConfig, TaskLauncher, Worker, WorkerContext,
        WorkerLauncher,
    };
    pub use crate::metrics::{InMemoryMetrics, NoopMetrics, PoolMetrics};
    pub use crate::outcome::{Outcome, RunResult};
    pub use crate::supervisor::{PoolStatus, PoolSupervisor};
}

// Re-export key types at crate root
pub use config::{PoolConfig, WorkerConfig, DEFAULT_FAILURE_BACKOFF};
pub use controller::{DesiredState, ScaleController};
pub use error::{ConfigError, LaunchError, PoolError, WorkerError};
pub use handle::{WorkerHandle, WorkerId};
pub use launcher::{
    worker_fn, FnWorker, ProcessLauncher, ProcessLauncherConfig, TaskLauncher, Worker,
    WorkerContext, WorkerLauncher, DEFAULT_MORE_WORK_EXIT_CODE,
};
pub use metrics::{InMemoryMetrics, NoopMetrics, PoolCounters, PoolMetrics, RunningGuard};
pub use outcome::{CompletedWorker, Outcome, RunResult, RunSummary};
pub use supervisor::{PoolSnapshot, PoolStatus, PoolSupervisor};
