//! Vaahai change application.
//!
//! Applies suggested code changes to files with a backup taken before
//! every write, rollback on failure, batching, LIFO undo and bounded backup
//! retention.

pub mod backup;
pub mod config;
pub mod edit;
pub mod error;
pub mod manager;
pub mod record;

pub use backup::{BackupEntry, BackupStore};
pub use config::ChangeConfig;
pub use error::{ChangeError, ChangeResult};
pub use manager::CodeChangeManager;
pub use record::{
    BatchFailure, BatchReport, ChangeOutcome, ChangeRecord, ChangeRequest, ChangeStatus,
    ChangeSummary,
};
