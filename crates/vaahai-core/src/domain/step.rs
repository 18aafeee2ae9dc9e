//! Review step descriptors and the executor contract.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::issue::{Category, Issue, Severity};
use crate::error::{RegistryError, RegistryResult};

/// Read-only context handed to every executor alongside the content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    pub file_path: Option<PathBuf>,
    pub language: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl StepContext {
    pub fn for_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The body of a review step.
///
/// Executors must be pure over their inputs: the runner may call several of
/// them concurrently against the same content.
pub trait StepExecutor: Send + Sync {
    fn execute(&self, content: &str, context: &StepContext) -> anyhow::Result<Vec<Issue>>;
}

impl<F> StepExecutor for F
where
    F: Fn(&str, &StepContext) -> anyhow::Result<Vec<Issue>> + Send + Sync,
{
    fn execute(&self, content: &str, context: &StepContext) -> anyhow::Result<Vec<Issue>> {
        self(content, context)
    }
}

/// A registered unit of review work.
#[derive(Clone)]
pub struct StepDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    /// Default severity for issues this step raises.
    pub severity: Severity,
    pub tags: BTreeSet<String>,
    executor: Arc<dyn StepExecutor>,
}

impl StepDescriptor {
    /// Build a descriptor around a closure executor.
    pub fn new<F>(
        id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        severity: Severity,
        executor: F,
    ) -> Self
    where
        F: Fn(&str, &StepContext) -> anyhow::Result<Vec<Issue>> + Send + Sync + 'static,
    {
        Self::with_executor(id, name, category, severity, Arc::new(executor))
    }

    /// Build a descriptor around an already shared executor.
    pub fn with_executor(
        id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        severity: Severity,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            severity,
            tags: BTreeSet::new(),
            executor,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn executor(&self) -> Arc<dyn StepExecutor> {
        Arc::clone(&self.executor)
    }

    /// True when the step carries at least one of `wanted`.
    pub fn has_any_tag(&self, wanted: &BTreeSet<String>) -> bool {
        wanted.iter().any(|tag| self.tags.contains(tag))
    }

    /// Check the fields registration depends on.
    pub(crate) fn validate(&self) -> RegistryResult<()> {
        if self.id.trim().is_empty() {
            return Err(RegistryError::InvalidStepConfig {
                step_id: self.id.clone(),
                reason: "id must not be empty".to_string(),
            });
        }
        if self.id.trim() != self.id {
            return Err(RegistryError::InvalidStepConfig {
                step_id: self.id.clone(),
                reason: "id must not have surrounding whitespace".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(RegistryError::InvalidStepConfig {
                step_id: self.id.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(RegistryError::InvalidStepConfig {
                step_id: self.id.clone(),
                reason: "tags must not be empty strings".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("severity", &self.severity)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// String-typed step metadata as it arrives from configuration files or
/// external check authors. Turned into a [`StepDescriptor`] once paired with
/// an executor; unknown category or severity names are rejected there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepManifest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl StepManifest {
    pub fn into_descriptor(
        self,
        executor: Arc<dyn StepExecutor>,
    ) -> RegistryResult<StepDescriptor> {
        let invalid = |reason: String| RegistryError::InvalidStepConfig {
            step_id: self.id.clone(),
            reason,
        };

        if self.category.trim().is_empty() {
            return Err(invalid("category is required".to_string()));
        }
        if self.severity.trim().is_empty() {
            return Err(invalid("severity is required".to_string()));
        }
        let category: Category = self.category.parse().map_err(invalid)?;
        let severity: Severity = self.severity.parse().map_err(invalid)?;

        let descriptor = StepDescriptor::with_executor(
            self.id.clone(),
            self.name.clone(),
            category,
            severity,
            executor,
        )
        .with_description(self.description.clone())
        .with_tags(self.tags.iter().cloned());
        descriptor.validate()?;
        Ok(descriptor)
    }
}
