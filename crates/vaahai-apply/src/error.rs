//! Errors from code change application.
//!
//! The variants split into two families. `Conflict`, `InvalidRequest`,
//! `NoBackupAvailable` and `NoChangeToUndo` mean nothing on disk changed.
//! `ApplyFailed` means a backup was taken and a write was attempted; the
//! file was then restored (see `rolled_back`) and the backup kept.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ChangeError {
    #[error("change conflict in {} at line {line_number}: {reason}", file_path.display())]
    Conflict {
        file_path: PathBuf,
        line_number: usize,
        reason: String,
    },

    #[error(
        "applying change to {} failed (rolled back: {rolled_back}, backup: {}): {source}",
        file_path.display(),
        backup_path.display()
    )]
    ApplyFailed {
        file_path: PathBuf,
        backup_path: PathBuf,
        rolled_back: bool,
        #[source]
        source: io::Error,
    },

    #[error("no backup available for {}", file_path.display())]
    NoBackupAvailable { file_path: PathBuf },

    #[error("no change to undo: {reason}")]
    NoChangeToUndo { reason: String },

    #[error("file access error on {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid change request: {0}")]
    InvalidRequest(String),
}

impl ChangeError {
    pub(crate) fn file_access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ChangeError::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// True when the failed call touched the disk (backup written, write
    /// attempted) before giving up.
    pub fn had_side_effects(&self) -> bool {
        matches!(self, ChangeError::ApplyFailed { .. })
    }

    /// True when a failed write was successfully reverted from its backup.
    pub fn is_rolled_back(&self) -> bool {
        matches!(
            self,
            ChangeError::ApplyFailed {
                rolled_back: true,
                ..
            }
        )
    }
}

pub type ChangeResult<T> = std::result::Result<T, ChangeError>;
