//! Per-run step progress.
//!
//! Each step moves through `pending -> in_progress -> {completed | failed}`,
//! or straight from `pending` to `skipped` when the run is cancelled before
//! the step is dispatched. Terminal states are final.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProgressError, ProgressResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    fn can_move_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::InProgress, StepStatus::Completed)
                | (StepStatus::InProgress, StepStatus::Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Execution state of one step within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub step_id: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Captured error text for failed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressRecord {
    fn pending(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Pending,
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    /// Wall-clock time between start and end, when both are known.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Counts of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ProgressCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed + self.skipped
    }

    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Progress for a single run invocation.
///
/// Workers update records concurrently; each update takes the lock for just
/// that record's transition.
#[derive(Debug)]
pub struct ProgressTracker {
    records: Mutex<Vec<ProgressRecord>>,
    index: HashMap<String, usize>,
}

impl ProgressTracker {
    /// Start tracking `step_ids`, all `pending`.
    pub fn new<I, S>(step_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut records = Vec::new();
        let mut index = HashMap::new();
        for id in step_ids {
            let id = id.as_ref();
            if index.contains_key(id) {
                continue;
            }
            index.insert(id.to_string(), records.len());
            records.push(ProgressRecord::pending(id));
        }
        Self {
            records: Mutex::new(records),
            index,
        }
    }

    pub fn start(&self, step_id: &str) -> ProgressResult<()> {
        self.transition(step_id, StepStatus::InProgress, None)
    }

    pub fn complete(&self, step_id: &str) -> ProgressResult<()> {
        self.transition(step_id, StepStatus::Completed, None)
    }

    pub fn fail(&self, step_id: &str, error: impl Into<String>) -> ProgressResult<()> {
        self.transition(step_id, StepStatus::Failed, Some(error.into()))
    }

    pub fn skip(&self, step_id: &str) -> ProgressResult<()> {
        self.transition(step_id, StepStatus::Skipped, None)
    }

    fn transition(
        &self,
        step_id: &str,
        next: StepStatus,
        error: Option<String>,
    ) -> ProgressResult<()> {
        let &i = self
            .index
            .get(step_id)
            .ok_or_else(|| ProgressError::UnknownStep {
                step_id: step_id.to_string(),
            })?;

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = &mut records[i];
        if !record.status.can_move_to(next) {
            return Err(ProgressError::InvalidTransition {
                step_id: step_id.to_string(),
                from: record.status.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now();
        match next {
            StepStatus::InProgress => record.started_at = Some(now),
            _ => record.ended_at = Some(now),
        }
        record.status = next;
        record.error = error;
        Ok(())
    }

    pub fn status(&self, step_id: &str) -> Option<StepStatus> {
        let &i = self.index.get(step_id)?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Some(records[i].status)
    }

    /// Copy of every record, in tracking order.
    pub fn snapshot(&self) -> Vec<ProgressRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn counts(&self) -> ProgressCounts {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut counts = ProgressCounts::default();
        for record in records.iter() {
            match record.status {
                StepStatus::Pending => counts.pending += 1,
                StepStatus::InProgress => counts.in_progress += 1,
                StepStatus::Completed => counts.completed += 1,
                StepStatus::Failed => counts.failed += 1,
                StepStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Fraction of steps in a terminal state, `0.0..=1.0`. A run with no
    /// steps is complete.
    pub fn percent_complete(&self) -> f64 {
        let counts = self.counts();
        if counts.total() == 0 {
            return 1.0;
        }
        counts.finished() as f64 / counts.total() as f64
    }

    pub fn is_finished(&self) -> bool {
        let counts = self.counts();
        counts.finished() == counts.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let tracker = ProgressTracker::new(["a", "b"]);
        tracker.start("a").unwrap();
        assert_eq!(tracker.status("a"), Some(StepStatus::InProgress));
        tracker.complete("a").unwrap();

        let record = &tracker.snapshot()[0];
        assert_eq!(record.status, StepStatus::Completed);
        assert!(record.started_at.is_some());
        assert!(record.ended_at.is_some());
        assert!(record.duration_ms().unwrap() >= 0);
    }

    #[test]
    fn failure_captures_error() {
        let tracker = ProgressTracker::new(["a"]);
        tracker.start("a").unwrap();
        tracker.fail("a", "boom").unwrap();
        let record = &tracker.snapshot()[0];
        assert_eq!(record.status, StepStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn terminal_states_are_final() {
        let tracker = ProgressTracker::new(["a"]);
        tracker.start("a").unwrap();
        tracker.complete("a").unwrap();
        let err = tracker.fail("a", "late").unwrap_err();
        assert!(matches!(err, ProgressError::InvalidTransition { .. }));
        assert!(tracker.start("a").is_err());
    }

    #[test]
    fn skip_only_from_pending() {
        let tracker = ProgressTracker::new(["a", "b"]);
        tracker.skip("a").unwrap();
        tracker.start("b").unwrap();
        assert!(tracker.skip("b").is_err());
        let record = &tracker.snapshot()[0];
        assert!(record.started_at.is_none());
    }

    #[test]
    fn pending_cannot_complete_directly() {
        let tracker = ProgressTracker::new(["a"]);
        assert!(tracker.complete("a").is_err());
    }

    #[test]
    fn unknown_step_is_rejected() {
        let tracker = ProgressTracker::new(["a"]);
        assert_eq!(
            tracker.start("nope").unwrap_err(),
            ProgressError::UnknownStep {
                step_id: "nope".to_string()
            }
        );
    }

    #[test]
    fn percent_complete_counts_all_terminal_states() {
        let tracker = ProgressTracker::new(["a", "b", "c", "d"]);
        assert_eq!(tracker.percent_complete(), 0.0);
        tracker.start("a").unwrap();
        tracker.complete("a").unwrap();
        tracker.start("b").unwrap();
        tracker.fail("b", "x").unwrap();
        tracker.skip("c").unwrap();
        assert_eq!(tracker.percent_complete(), 0.75);
        assert!(!tracker.is_finished());

        let counts = tracker.counts();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.pending, 1);
    }

    #[test]
    fn empty_run_is_complete() {
        let tracker = ProgressTracker::new(Vec::<String>::new());
        assert_eq!(tracker.percent_complete(), 1.0);
        assert!(tracker.is_finished());
    }
}
