//! Code change manager configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vaahai_core::error::{ConfigError, ConfigResult};

pub const ENV_BACKUP_DIR: &str = "VAAHAI_BACKUP_DIR";
pub const ENV_MAX_BACKUPS: &str = "VAAHAI_MAX_BACKUPS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeConfig {
    /// Where backups are written. Defaults to `~/.vaahai/backups`.
    pub backup_dir: PathBuf,
    /// Retention limit for backups taken by one manager. `0` keeps all.
    pub max_backups: usize,
    /// Validate and preview changes without writing anything.
    pub dry_run: bool,
    /// Whether callers should ask before applying. Not enforced here.
    pub confirm_changes: bool,
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            max_backups: 50,
            dry_run: false,
            confirm_changes: true,
        }
    }
}

pub fn default_backup_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vaahai")
        .join("backups")
}

impl ChangeConfig {
    pub fn with_backup_dir(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)?.with_env_overrides()
    }

    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        if let Some(dir) = lookup(ENV_BACKUP_DIR) {
            self.backup_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_MAX_BACKUPS) {
            self.max_backups = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_MAX_BACKUPS}={raw}")))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.backup_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "backup_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dir_is_under_dot_vaahai() {
        let config = ChangeConfig::default();
        assert!(config.backup_dir.ends_with(".vaahai/backups"));
        assert!(!config.dry_run);
        assert!(config.confirm_changes);
    }

    #[test]
    fn toml_overrides_fields() {
        let config = ChangeConfig::from_toml_str(
            r#"
            backup_dir = "/tmp/vaahai-backups"
            max_backups = 5
            dry_run = true
            "#,
        )
        .unwrap();
        assert_eq!(config.backup_dir, PathBuf::from("/tmp/vaahai-backups"));
        assert_eq!(config.max_backups, 5);
        assert!(config.dry_run);
        assert!(config.confirm_changes);
    }

    #[test]
    fn empty_backup_dir_is_invalid() {
        assert!(ChangeConfig::from_toml_str("backup_dir = \"\"").is_err());
    }

    #[test]
    fn env_style_overrides() {
        let config = ChangeConfig::with_backup_dir("/a")
            .with_overrides(|key| match key {
                ENV_BACKUP_DIR => Some("/b".to_string()),
                ENV_MAX_BACKUPS => Some("0".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.backup_dir, PathBuf::from("/b"));
        assert_eq!(config.max_backups, 0);

        let err = ChangeConfig::with_backup_dir("/a")
            .with_overrides(|key| (key == ENV_MAX_BACKUPS).then(|| "-1".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
