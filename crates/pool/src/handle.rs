//! Handles to in-flight worker executions

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::outcome::Outcome;

/// Identifier of one worker execution (UUID v7, ordered by launch time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for WorkerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

enum Completion {
    Pending(JoinHandle<Outcome>),
    Done(Outcome),
}

/// Handle to one in-flight worker execution.
///
/// The outcome is produced once by the underlying execution and cached, so
/// joining an already joined handle returns the same value without touching
/// the worker again. Dropping an unfinished handle cancels the worker.
pub struct WorkerHandle {
    id: WorkerId,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    completion: Completion,
}

impl WorkerHandle {
    /// Wrap an already spawned execution.
    ///
    /// The execution is expected to observe `cancel` and resolve to
    /// [`Outcome::Cancelled`] once it has actually stopped.
    pub fn new(id: WorkerId, cancel: CancellationToken, join: JoinHandle<Outcome>) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            cancel,
            completion: Completion::Pending(join),
        }
    }

    /// Spawn `execution` on the tokio runtime.
    ///
    /// Cancellation is cooperative: the execution is expected to watch
    /// `cancel` and return on its own, and whatever it returns after the
    /// token fired is reported as [`Outcome::Cancelled`]. An execution that
    /// ignores the token keeps running until it finishes, see
    /// [`WorkerHandle::spawn_with_grace`] to bound that.
    pub fn spawn<F>(id: WorkerId, cancel: CancellationToken, execution: F) -> Self
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        Self::spawn_inner(id, cancel, None, execution)
    }

    /// Like [`WorkerHandle::spawn`], but the execution is dropped if it is
    /// still running `grace` after cancellation was requested.
    pub fn spawn_with_grace<F>(
        id: WorkerId,
        cancel: CancellationToken,
        grace: Duration,
        execution: F,
    ) -> Self
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        Self::spawn_inner(id, cancel, Some(grace), execution)
    }

    fn spawn_inner<F>(
        id: WorkerId,
        cancel: CancellationToken,
        grace: Option<Duration>,
        execution: F,
    ) -> Self
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let outcome = match grace {
                None => execution.await,
                Some(grace) => {
                    let deadline = async {
                        token.cancelled().await;
                        tokio::time::sleep(grace).await;
                    };
                    tokio::select! {
                        biased;
                        outcome = execution => outcome,
                        _ = deadline => {
                            warn!(
                                worker_id = %id,
                                grace_ms = grace.as_millis() as u64,
                                "Worker ignored cancellation, dropping it"
                            );
                            Outcome::Cancelled
                        }
                    }
                }
            };
            if token.is_cancelled() {
                Outcome::Cancelled
            } else {
                outcome
            }
        });
        Self::new(id, cancel, join)
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Request termination. Idempotent and safe after completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Non-blocking completion check
    pub fn is_finished(&self) -> bool {
        match &self.completion {
            Completion::Done(_) => true,
            Completion::Pending(join) => join.is_finished(),
        }
    }

    /// Wait for the worker to terminate and return its outcome
    pub async fn join(&mut self) -> Outcome {
        futures::future::poll_fn(|cx| self.poll_join(cx)).await
    }

    /// Poll for the terminal outcome, caching it on first completion
    pub fn poll_join(&mut self, cx: &mut Context<'_>) -> Poll<Outcome> {
        match &mut self.completion {
            Completion::Done(outcome) => Poll::Ready(outcome.clone()),
            Completion::Pending(join) => {
                let outcome = match ready!(Pin::new(join).poll(cx)) {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_cancelled() => Outcome::Cancelled,
                    Err(e) => Outcome::failure(format!("worker panicked: {e}")),
                };
                self.completion = Completion::Done(outcome.clone());
                Poll::Ready(outcome)
            }
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if matches!(self.completion, Completion::Pending(_)) {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_returns_outcome() {
        let mut handle = WorkerHandle::spawn(WorkerId::new(), CancellationToken::new(), async {
            Outcome::success(true)
        });
        assert_eq!(handle.join().await, Outcome::success(true));
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_second_join_returns_cached_outcome() {
        let mut handle = WorkerHandle::spawn(WorkerId::new(), CancellationToken::new(), async {
            Outcome::failure("bad batch")
        });
        let first = handle.join().await;
        let second = handle.join().await;
        assert_eq!(first, second);
        assert!(first.is_failure());
    }

    #[tokio::test]
    async fn test_cancelled_worker_runs_its_cleanup() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (cleaned_tx, cleaned_rx) = tokio::sync::oneshot::channel();
        let mut handle = WorkerHandle::spawn(WorkerId::new(), cancel, async move {
            token.cancelled().await;
            tokio::task::yield_now().await;
            let _ = cleaned_tx.send(());
            Outcome::success(false)
        });

        handle.cancel();
        handle.cancel();
        assert_eq!(handle.join().await, Outcome::Cancelled);
        assert!(cleaned_rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_drops_worker_ignoring_cancellation() {
        let mut handle = WorkerHandle::spawn_with_grace(
            WorkerId::new(),
            CancellationToken::new(),
            Duration::from_secs(2),
            std::future::pending::<Outcome>(),
        );

        let started = tokio::time::Instant::now();
        handle.cancel();
        assert_eq!(handle.join().await, Outcome::Cancelled);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_lets_cooperative_worker_finish() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut handle = WorkerHandle::spawn_with_grace(
            WorkerId::new(),
            cancel,
            Duration::from_secs(30),
            async move {
                token.cancelled().await;
                tokio::time::sleep(Duration::from_secs(1)).await;
                Outcome::success(true)
            },
        );

        let started = tokio::time::Instant::now();
        handle.cancel();
        assert_eq!(handle.join().await, Outcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_cancel_after_completion_is_noop() {
        let mut handle = WorkerHandle::spawn(WorkerId::new(), CancellationToken::new(), async {
            Outcome::success(false)
        });
        assert_eq!(handle.join().await, Outcome::success(false));
        handle.cancel();
        assert_eq!(handle.join().await, Outcome::success(false));
    }

    #[tokio::test]
    async fn test_panicking_worker_reports_failure() {
        let mut handle = WorkerHandle::spawn(WorkerId::new(), CancellationToken::new(), async {
            let blow_up = true;
            if blow_up {
                panic!("worker blew up");
            }
            Outcome::success(false)
        });
        let outcome = handle.join().await;
        assert!(outcome.is_failure());
    }

    #[test]
    fn test_worker_id_display() {
        let id = WorkerId::new();
        assert!(id.to_string().starts_with("worker-"));
    }
}
