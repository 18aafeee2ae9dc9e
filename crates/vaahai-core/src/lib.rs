//! Vaahai review core.
//!
//! Review steps are registered once into a [`StepRegistry`], selected with a
//! [`StepFilter`], executed by a [`StepRunner`] with per-step fault isolation,
//! and summarised by [`StatisticsSummary`].

pub mod config;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod files;
pub mod metrics;
pub mod obs;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod stats;
pub mod telemetry;

pub use config::ReviewConfig;
pub use domain::{
    Category, Issue, Severity, StepContext, StepDescriptor, StepExecutor, StepManifest,
};
pub use error::{
    ConfigError, ConfigResult, ProgressError, RegistryError, RegistryResult, RunError, RunResult,
    StepError,
};
pub use files::{FileAccess, OsFileAccess};
pub use metrics::METRICS;
pub use obs::RunSpan;
pub use progress::{ProgressCounts, ProgressRecord, ProgressTracker, StepStatus};
pub use registry::{StepFilter, StepRegistry};
pub use runner::{
    cancel_pair, CancelHandle, CancelSignal, DirectoryReport, FileReport, RunReport, StepFailure,
    StepRunner,
};
pub use stats::StatisticsSummary;
pub use telemetry::{init_tracing, LogFormat};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
