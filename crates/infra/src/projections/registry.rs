use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use super::definition::ProjectionDefinition;

/// Outcome of [`ProjectionRegistry::create_or_update`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Registration {
    Created,
    Updated,
    /// An identical definition was already registered.
    Unchanged,
}

/// Named projection definitions, looked up by name or by feed.
#[derive(Debug, Default)]
pub struct ProjectionRegistry {
    definitions: RwLock<BTreeMap<String, Arc<ProjectionDefinition>>>,
}

impl ProjectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert keyed by the definition's name.
    pub fn create_or_update(&self, definition: ProjectionDefinition) -> Registration {
        let mut definitions = self.definitions.write().unwrap_or_else(PoisonError::into_inner);

        let registration = match definitions.get(definition.name()) {
            None => Registration::Created,
            Some(existing) if **existing == definition => return Registration::Unchanged,
            Some(_) => Registration::Updated,
        };

        info!(
            projection = definition.name(),
            feed = definition.feed(),
            ?registration,
            "registered projection"
        );
        definitions.insert(definition.name().to_string(), Arc::new(definition));
        registration
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProjectionDefinition>> {
        let definitions = self.definitions.read().unwrap_or_else(PoisonError::into_inner);
        definitions.get(name).cloned()
    }

    /// Definitions consuming `feed`, ordered by name.
    pub fn for_feed(&self, feed: &str) -> Vec<Arc<ProjectionDefinition>> {
        let definitions = self.definitions.read().unwrap_or_else(PoisonError::into_inner);
        definitions
            .values()
            .filter(|d| d.feed() == feed)
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let definitions = self.definitions.read().unwrap_or_else(PoisonError::into_inner);
        definitions.keys().cloned().collect()
    }

    /// Returns whether a definition was removed.
    pub fn delete(&self, name: &str) -> bool {
        let mut definitions = self.definitions.write().unwrap_or_else(PoisonError::into_inner);
        definitions.remove(name).is_some()
    }
}
