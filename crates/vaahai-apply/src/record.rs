//! Change requests, the audit records they produce, and summaries.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChangeError, ChangeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Applied,
    Rejected,
    Undone,
    Failed,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Applied => "applied",
            ChangeStatus::Rejected => "rejected",
            ChangeStatus::Undone => "undone",
            ChangeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A suggested replacement of `original_code` at `line_number` (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub file_path: PathBuf,
    pub line_number: usize,
    pub original_code: String,
    pub suggested_code: String,
}

impl ChangeRequest {
    pub fn new(
        file_path: impl Into<PathBuf>,
        line_number: usize,
        original_code: impl Into<String>,
        suggested_code: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
            original_code: original_code.into(),
            suggested_code: suggested_code.into(),
        }
    }

    pub fn validate(&self) -> ChangeResult<()> {
        if self.file_path.as_os_str().is_empty() {
            return Err(ChangeError::InvalidRequest(
                "file path is empty".to_string(),
            ));
        }
        if self.line_number == 0 {
            return Err(ChangeError::InvalidRequest(
                "line numbers start at 1".to_string(),
            ));
        }
        if self.original_code.lines().next().is_none() {
            return Err(ChangeError::InvalidRequest(
                "original code is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One entry in the change history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: String,
    pub file_path: PathBuf,
    pub line_number: usize,
    pub original_code: String,
    pub suggested_code: String,
    pub backup_path: Option<PathBuf>,
    /// SHA-256 of the backup contents, checked before an undo restores it.
    pub backup_digest: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: ChangeStatus,
    pub error: Option<String>,
}

impl ChangeRecord {
    pub(crate) fn from_request(request: &ChangeRequest, status: ChangeStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: request.file_path.clone(),
            line_number: request.line_number,
            original_code: request.original_code.clone(),
            suggested_code: request.suggested_code.clone(),
            backup_path: None,
            backup_digest: None,
            timestamp: Utc::now(),
            status,
            error: None,
        }
    }

    pub(crate) fn with_error(mut self, error: &dyn fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn is_for(&self, path: &Path) -> bool {
        self.file_path == path
    }
}

/// Result of a successful `apply_change` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    Applied(ChangeRecord),
    /// Dry run: the change validated and this is what the file would become.
    Previewed {
        file_path: PathBuf,
        new_content: String,
    },
}

impl ChangeOutcome {
    pub fn record(&self) -> Option<&ChangeRecord> {
        match self {
            ChangeOutcome::Applied(record) => Some(record),
            ChangeOutcome::Previewed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub file_path: PathBuf,
    pub line_number: usize,
    pub error: String,
}

/// Outcome of applying the pending batch. Failures do not stop the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub applied: usize,
    pub previewed: usize,
    pub failed: usize,
    pub errors: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub applied: usize,
    pub rejected: usize,
    pub undone: usize,
    pub failed: usize,
    pub pending: usize,
    /// Files with at least one applied or undone change.
    pub affected_files: BTreeSet<PathBuf>,
}

impl ChangeSummary {
    pub(crate) fn from_history(history: &[ChangeRecord], pending: usize) -> Self {
        let mut summary = ChangeSummary {
            pending,
            ..Default::default()
        };
        for record in history {
            match record.status {
                ChangeStatus::Applied => summary.applied += 1,
                ChangeStatus::Rejected => summary.rejected += 1,
                ChangeStatus::Undone => summary.undone += 1,
                ChangeStatus::Failed => summary.failed += 1,
            }
            if matches!(record.status, ChangeStatus::Applied | ChangeStatus::Undone) {
                summary.affected_files.insert(record.file_path.clone());
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validation() {
        assert!(ChangeRequest::new("a.py", 1, "x", "y").validate().is_ok());
        assert!(ChangeRequest::new("a.py", 0, "x", "y").validate().is_err());
        assert!(ChangeRequest::new("a.py", 1, "", "y").validate().is_err());
        assert!(ChangeRequest::new("", 1, "x", "y").validate().is_err());
        // Deleting lines is allowed.
        assert!(ChangeRequest::new("a.py", 1, "x", "").validate().is_ok());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ChangeStatus::Undone).unwrap();
        assert_eq!(json, "\"undone\"");
    }

    #[test]
    fn summary_counts_statuses_and_files() {
        let req_a = ChangeRequest::new("a.py", 1, "x", "y");
        let req_b = ChangeRequest::new("b.py", 1, "x", "y");
        let history = vec![
            ChangeRecord::from_request(&req_a, ChangeStatus::Applied),
            ChangeRecord::from_request(&req_a, ChangeStatus::Undone),
            ChangeRecord::from_request(&req_b, ChangeStatus::Rejected),
            ChangeRecord::from_request(&req_b, ChangeStatus::Failed),
        ];
        let summary = ChangeSummary::from_history(&history, 3);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.undone, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 3);
        assert_eq!(
            summary.affected_files.into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("a.py")]
        );
    }

    #[test]
    fn records_get_unique_ids() {
        let req = ChangeRequest::new("a.py", 1, "x", "y");
        let a = ChangeRecord::from_request(&req, ChangeStatus::Applied);
        let b = ChangeRecord::from_request(&req, ChangeStatus::Applied);
        assert_ne!(a.id, b.id);
    }
}
