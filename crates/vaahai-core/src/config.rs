//! Review run configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

pub const ENV_MAX_WORKERS: &str = "VAAHAI_MAX_WORKERS";
pub const ENV_STEP_TIMEOUT_SECS: &str = "VAAHAI_STEP_TIMEOUT_SECS";

/// Tunables for the step runner and statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Maximum number of steps executing at once.
    pub max_workers: usize,
    /// Per-step timeout in seconds. `0` disables the timeout.
    pub step_timeout_secs: u64,
    /// How many key findings the statistics summary keeps.
    pub key_findings_limit: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            step_timeout_secs: 30,
            key_findings_limit: 10,
        }
    }
}

impl ReviewConfig {
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?.with_env_overrides()?;
        Ok(config)
    }

    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        if let Some(raw) = lookup(ENV_MAX_WORKERS) {
            self.max_workers = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_MAX_WORKERS}={raw}")))?;
        }
        if let Some(raw) = lookup(ENV_STEP_TIMEOUT_SECS) {
            self.step_timeout_secs = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_STEP_TIMEOUT_SECS}={raw}")))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        (self.step_timeout_secs > 0).then(|| Duration::from_secs(self.step_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReviewConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.step_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ReviewConfig::from_toml_str("max_workers = 8").unwrap();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.key_findings_limit, 10);
    }

    #[test]
    fn zero_timeout_disables() {
        let config = ReviewConfig::from_toml_str("step_timeout_secs = 0").unwrap();
        assert_eq!(config.step_timeout(), None);
    }

    #[test]
    fn zero_workers_rejected() {
        let err = ReviewConfig::from_toml_str("max_workers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = ReviewConfig::from_toml_str("max_workers = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn overrides_apply() {
        let config = ReviewConfig::default()
            .with_overrides(|key| match key {
                ENV_MAX_WORKERS => Some("2".to_string()),
                ENV_STEP_TIMEOUT_SECS => Some("5".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.step_timeout_secs, 5);
    }

    #[test]
    fn bad_override_is_invalid() {
        let err = ReviewConfig::default()
            .with_overrides(|key| (key == ENV_MAX_WORKERS).then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("review.toml");
        std::fs::write(&path, "key_findings_limit = 3\n").unwrap();
        let config = ReviewConfig::load(&path).unwrap();
        assert_eq!(config.key_findings_limit, 3);
        assert!(ReviewConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
