use std::sync::Arc;

use thiserror::Error;

use super::definition::ProjectionKind;
use super::registry::ProjectionRegistry;
use super::store::{DocumentStore, ProjectionDocument};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown projection '{0}'")]
    UnknownProjection(String),

    #[error("projection '{projection}' has no document '{id}'")]
    NotFound { projection: String, id: String },

    #[error("projection '{0}' is not aggregated")]
    NotAggregated(String),
}

/// Read side of the projections.
#[derive(Debug, Clone)]
pub struct ProjectionQueryService<S> {
    registry: Arc<ProjectionRegistry>,
    store: S,
}

impl<S> ProjectionQueryService<S>
where
    S: DocumentStore,
{
    pub fn new(registry: Arc<ProjectionRegistry>, store: S) -> Self {
        Self { registry, store }
    }

    fn ensure_registered(&self, name: &str) -> Result<ProjectionKind, QueryError> {
        self.registry
            .get(name)
            .map(|d| d.kind())
            .ok_or_else(|| QueryError::UnknownProjection(name.to_string()))
    }

    pub fn get(&self, name: &str, id: &str) -> Result<ProjectionDocument, QueryError> {
        self.ensure_registered(name)?;
        self.store.get(name, id).ok_or_else(|| QueryError::NotFound {
            projection: name.to_string(),
            id: id.to_string(),
        })
    }

    /// The single document of an aggregated projection.
    pub fn get_aggregated(&self, name: &str) -> Result<ProjectionDocument, QueryError> {
        if self.ensure_registered(name)? != ProjectionKind::Aggregated {
            return Err(QueryError::NotAggregated(name.to_string()));
        }
        self.get(name, name)
    }

    /// Documents ordered by id, optionally only those with the given reference.
    pub fn list(&self, name: &str, reference: Option<&str>) -> Result<Vec<ProjectionDocument>, QueryError> {
        self.ensure_registered(name)?;
        Ok(match reference {
            Some(reference) => self.store.list_by_reference(name, reference),
            None => self.store.list(name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::definition::{ProjectionDefinition, inc, prepend};
    use crate::projections::store::InMemoryDocumentStore;

    fn service() -> ProjectionQueryService<Arc<InMemoryDocumentStore>> {
        let registry = Arc::new(ProjectionRegistry::new());
        registry.create_or_update(
            ProjectionDefinition::single("lists")
                .feed("list")
                .on("TodoAdded", [prepend("todos")])
                .build()
                .unwrap(),
        );
        registry.create_or_update(
            ProjectionDefinition::aggregated("stats")
                .feed("order")
                .on("OrderShippedEvent", [inc("count")])
                .build()
                .unwrap(),
        );
        ProjectionQueryService::new(registry, Arc::new(InMemoryDocumentStore::new()))
    }

    #[test]
    fn missing_documents_are_not_found() {
        let err = service().get("lists", "nope").unwrap_err();
        assert_eq!(
            err,
            QueryError::NotFound {
                projection: "lists".to_string(),
                id: "nope".to_string()
            }
        );
    }

    #[test]
    fn unknown_projections_are_reported() {
        let service = service();
        assert_eq!(
            service.list("games", None).unwrap_err(),
            QueryError::UnknownProjection("games".to_string())
        );
        assert!(service.list("lists", Some("EMPTY")).unwrap().is_empty());
    }

    #[test]
    fn get_aggregated_requires_an_aggregated_projection() {
        let service = service();
        assert_eq!(
            service.get_aggregated("lists").unwrap_err(),
            QueryError::NotAggregated("lists".to_string())
        );
        assert!(matches!(
            service.get_aggregated("stats").unwrap_err(),
            QueryError::NotFound { .. }
        ));
    }
}
