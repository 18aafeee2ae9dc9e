//! Review domain types: findings, step descriptors and the executor contract.

pub mod issue;
pub mod step;

pub use issue::{Category, Issue, Severity};
pub use step::{StepContext, StepDescriptor, StepExecutor, StepManifest};
