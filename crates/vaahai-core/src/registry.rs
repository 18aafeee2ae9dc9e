//! Step registry: the set of review steps available to a process.
//!
//! The registry is built once at start-up through explicit `register` calls
//! and is then shared read-only (behind an `Arc`) with every run.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::domain::{Category, Severity, StepDescriptor, StepExecutor, StepManifest};
use crate::error::{RegistryError, RegistryResult};

/// Selection criteria for [`StepRegistry::get_steps`].
///
/// `step_ids` is exclusive: when non-empty, the other dimensions are ignored.
/// Otherwise the provided dimensions are combined with AND, and the `tags`
/// dimension matches a step carrying any of the requested tags. An empty
/// id list or an empty set counts as "not provided".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepFilter {
    pub step_ids: Option<Vec<String>>,
    pub categories: Option<HashSet<Category>>,
    pub severities: Option<HashSet<Severity>>,
    pub tags: Option<BTreeSet<String>>,
}

impl StepFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            step_ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.categories = Some(categories.into_iter().collect());
        self
    }

    pub fn severities(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.severities = Some(severities.into_iter().collect());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    fn matches(&self, step: &StepDescriptor) -> bool {
        if let Some(categories) = self.categories.as_ref().filter(|c| !c.is_empty()) {
            if !categories.contains(&step.category) {
                return false;
            }
        }
        if let Some(severities) = self.severities.as_ref().filter(|s| !s.is_empty()) {
            if !severities.contains(&step.severity) {
                return false;
            }
        }
        if let Some(tags) = self.tags.as_ref().filter(|t| !t.is_empty()) {
            if !step.has_any_tag(tags) {
                return false;
            }
        }
        true
    }
}

/// Ordered, uniqueness-enforcing collection of step descriptors.
#[derive(Debug, Default)]
pub struct StepRegistry {
    steps: Vec<Arc<StepDescriptor>>,
    index: HashMap<String, usize>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step. Invalid or duplicate descriptors never enter the registry.
    pub fn register(&mut self, descriptor: StepDescriptor) -> RegistryResult<()> {
        descriptor.validate()?;
        if self.index.contains_key(&descriptor.id) {
            return Err(RegistryError::DuplicateStep {
                step_id: descriptor.id,
            });
        }
        debug!(step_id = %descriptor.id, category = %descriptor.category, "registered review step");
        self.index.insert(descriptor.id.clone(), self.steps.len());
        self.steps.push(Arc::new(descriptor));
        Ok(())
    }

    /// Validate a string-typed manifest and register it with `executor`.
    pub fn register_manifest(
        &mut self,
        manifest: StepManifest,
        executor: Arc<dyn StepExecutor>,
    ) -> RegistryResult<()> {
        let descriptor = manifest.into_descriptor(executor)?;
        self.register(descriptor)
    }

    /// Select steps. See [`StepFilter`] for the semantics.
    pub fn get_steps(&self, filter: &StepFilter) -> RegistryResult<Vec<Arc<StepDescriptor>>> {
        if let Some(ids) = filter.step_ids.as_ref().filter(|ids| !ids.is_empty()) {
            return ids
                .iter()
                .map(|id| {
                    self.get(id).ok_or_else(|| RegistryError::UnknownStep {
                        step_id: id.clone(),
                    })
                })
                .collect();
        }

        Ok(self
            .steps
            .iter()
            .filter(|step| filter.matches(step))
            .cloned()
            .collect())
    }

    pub fn get(&self, id: &str) -> Option<Arc<StepDescriptor>> {
        self.index.get(id).map(|&i| Arc::clone(&self.steps[i]))
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Registered ids in registration order.
    pub fn list_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
