//! Error types for the pool controller

use serde::{Deserialize, Serialize};

use crate::outcome::RunResult;

/// Errors returned by the pool controller
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Caller passed an argument outside the accepted range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stop/drain requested before the run loop was started
    #[error("pool is not running")]
    NotRunning,

    /// A second `run()` was attempted while one is in progress
    #[error("pool is already running")]
    AlreadyRunning,

    /// `run()` was called on a supervisor whose run already finished
    #[error("pool has already stopped")]
    AlreadyStopped,

    /// A reconciliation step failed; outstanding workers were cancelled and joined
    #[error("pool run aborted: {source}")]
    Aborted {
        #[source]
        source: LaunchError,
        /// Outcomes observed before (and while) aborting
        partial: RunResult,
    },
}

impl PoolError {
    /// Partial results carried by an aborted run
    pub fn partial_result(&self) -> Option<&RunResult> {
        match self {
            PoolError::Aborted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// Errors raised by a [`WorkerLauncher`](crate::launcher::WorkerLauncher)
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The underlying process or task could not be spawned
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The launcher refused to start another worker
    #[error("launch rejected: {0}")]
    Rejected(String),
}

/// Failure reported by a worker execution.
///
/// Cloneable so that a cached outcome can be handed out by repeated joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct WorkerError {
    pub message: String,
}

impl WorkerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for WorkerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for WorkerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A value could not be parsed or is out of range
    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_error_display() {
        let err = WorkerError::new("batch rejected");
        assert_eq!(err.to_string(), "batch rejected");
        assert_eq!(WorkerError::from("x"), WorkerError::new("x"));
    }

    #[test]
    fn test_aborted_carries_partial_result() {
        let err = PoolError::Aborted {
            source: LaunchError::Rejected("quota".into()),
            partial: RunResult::default(),
        };
        assert!(err.to_string().contains("quota"));
        assert!(err.partial_result().is_some());
        assert!(PoolError::NotRunning.partial_result().is_none());
    }
}
