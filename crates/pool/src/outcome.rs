//! Worker outcomes and run result aggregation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;
use crate::handle::WorkerId;

/// Terminal result of one worker execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Worker finished; `more_work` asks the pool to drive the job again
    Success { more_work: bool },
    /// Worker failed; retried with backoff while the pool is active
    Failure(WorkerError),
    /// Worker was cancelled before it finished
    Cancelled,
}

impl Outcome {
    pub fn success(more_work: bool) -> Self {
        Outcome::Success { more_work }
    }

    pub fn failure(error: impl Into<WorkerError>) -> Self {
        Outcome::Failure(error.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// True when the worker asked to be re-driven
    pub fn wants_more_work(&self) -> bool {
        matches!(self, Outcome::Success { more_work: true })
    }
}

/// One entry of a [`RunResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedWorker {
    pub id: WorkerId,
    pub started_at: DateTime<Utc>,
    pub outcome: Outcome,
}

/// Outcomes of every worker a run ever scheduled.
///
/// Entries are kept in arrival order, which carries no meaning beyond
/// presence and count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    workers: Vec<CompletedWorker>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, id: WorkerId, started_at: DateTime<Utc>, outcome: Outcome) {
        self.workers.push(CompletedWorker {
            id,
            started_at,
            outcome,
        });
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers(&self) -> &[CompletedWorker] {
        &self.workers
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.workers.iter().map(|w| &w.outcome)
    }

    pub fn successes(&self) -> usize {
        self.outcomes().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes().filter(|o| o.is_failure()).count()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes().filter(|o| o.is_cancelled()).count()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.len(),
            succeeded: self.successes(),
            failed: self.failures(),
            cancelled: self.cancelled(),
        }
    }
}

impl IntoIterator for RunResult {
    type Item = CompletedWorker;
    type IntoIter = std::vec::IntoIter<CompletedWorker>;

    fn into_iter(self) -> Self::IntoIter {
        self.workers.into_iter()
    }
}

/// Outcome counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        assert!(Outcome::success(true).wants_more_work());
        assert!(!Outcome::success(false).wants_more_work());
        assert!(Outcome::failure("boom").is_failure());
        assert!(Outcome::Cancelled.is_cancelled());
        assert!(!Outcome::Cancelled.is_success());
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let json = serde_json::to_value(Outcome::success(true)).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["more_work"], true);

        let json = serde_json::to_value(Outcome::failure("disk full")).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["message"], "disk full");
    }

    #[test]
    fn test_summary_counts_every_entry() {
        let mut result = RunResult::new();
        let now = Utc::now();
        result.record(WorkerId::new(), now, Outcome::success(false));
        result.record(WorkerId::new(), now, Outcome::failure("x"));
        result.record(WorkerId::new(), now, Outcome::Cancelled);
        result.record(WorkerId::new(), now, Outcome::success(true));

        let summary = result.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 1);
    }
}
