//! Error taxonomy for the review core.
//!
//! Registry errors are fatal and surface at configuration time. Step errors
//! never escape a run: the runner captures them into the run report. Run
//! errors describe a target (a file) that could not be reviewed at all.

use std::path::PathBuf;

/// Errors raised while registering or selecting review steps.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate step id: {step_id}")]
    DuplicateStep { step_id: String },

    #[error("invalid step config for '{step_id}': {reason}")]
    InvalidStepConfig { step_id: String, reason: String },

    #[error("unknown step id: {step_id}")]
    UnknownStep { step_id: String },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Why a single step failed inside a run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    #[error("step '{step_id}' failed: {message}")]
    Execution { step_id: String, message: String },

    #[error("step '{step_id}' timed out after {timeout_ms} ms")]
    Timeout { step_id: String, timeout_ms: u64 },

    #[error("step '{step_id}' panicked: {message}")]
    Panicked { step_id: String, message: String },
}

impl StepError {
    pub fn step_id(&self) -> &str {
        match self {
            StepError::Execution { step_id, .. }
            | StepError::Timeout { step_id, .. }
            | StepError::Panicked { step_id, .. } => step_id,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::Timeout { .. })
    }
}

/// Run-level failures: the review target, not a step, failed.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("file unreadable: {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type RunResult<T> = std::result::Result<T, RunError>;

/// Progress state machine violations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("step not tracked in this run: {step_id}")]
    UnknownStep { step_id: String },

    #[error("invalid transition for step '{step_id}': {from} -> {to}")]
    InvalidTransition {
        step_id: String,
        from: String,
        to: String,
    },
}

pub type ProgressResult<T> = std::result::Result<T, ProgressError>;

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_error_display() {
        let err = RegistryError::DuplicateStep {
            step_id: "secrets".to_string(),
        };
        assert!(err.to_string().contains("duplicate step id"));
        assert!(err.to_string().contains("secrets"));
    }

    #[test]
    fn step_error_accessors() {
        let err = StepError::Timeout {
            step_id: "slow".to_string(),
            timeout_ms: 50,
        };
        assert_eq!(err.step_id(), "slow");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("50 ms"));

        let err = StepError::Execution {
            step_id: "boom".to_string(),
            message: "bad regex".to_string(),
        };
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("bad regex"));
    }

    #[test]
    fn run_error_names_path() {
        let err = RunError::FileNotFound {
            path: PathBuf::from("src/missing.py"),
        };
        assert!(err.to_string().contains("src/missing.py"));
    }
}
