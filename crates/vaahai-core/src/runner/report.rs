//! Run results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::Issue;
use crate::error::StepError;
use crate::progress::{ProgressRecord, StepStatus};

/// A step that did not produce issues because it errored or timed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_id: String,
    pub error: String,
    pub timed_out: bool,
}

impl From<StepError> for StepFailure {
    fn from(err: StepError) -> Self {
        Self {
            step_id: err.step_id().to_string(),
            timed_out: err.is_timeout(),
            error: err.to_string(),
        }
    }
}

/// Outcome of one run over one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    /// Issues from every step that completed, grouped in step order.
    pub issues: Vec<Issue>,
    pub progress: Vec<ProgressRecord>,
    pub failures: Vec<StepFailure>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn failed_step_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.step_id.as_str()).collect()
    }

    pub fn status_of(&self, step_id: &str) -> Option<StepStatus> {
        self.progress
            .iter()
            .find(|r| r.step_id == step_id)
            .map(|r| r.status)
    }

    /// True when every step completed.
    pub fn succeeded(&self) -> bool {
        self.progress
            .iter()
            .all(|r| r.status == StepStatus::Completed)
    }
}

/// A run over a file, with the line count used for density statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub line_count: usize,
    pub report: RunReport,
}

/// Runs over a list of files, keyed by path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryReport {
    pub files: BTreeMap<PathBuf, FileReport>,
    /// Files that could not be reviewed at all (missing, unreadable).
    pub failures: BTreeMap<PathBuf, String>,
}

impl DirectoryReport {
    pub fn total_issues(&self) -> usize {
        self.files.values().map(|f| f.report.issues.len()).sum()
    }

    /// Every issue paired with its file, in path order.
    pub fn all_issues(&self) -> Vec<(&PathBuf, &Issue)> {
        self.files
            .iter()
            .flat_map(|(path, file)| file.report.issues.iter().map(move |issue| (path, issue)))
            .collect()
    }
}
