use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A projection's read model for one key.
///
/// Single projections keep one document per aggregate (`id` is the aggregate
/// id); aggregated projections keep exactly one document whose id is the
/// projection name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionDocument {
    projection: String,
    id: String,
    data: JsonValue,
    reference: Option<String>,
    /// Highest sequence number already folded into `data`.
    last_applied: u64,
    updated_at: DateTime<Utc>,
}

impl ProjectionDocument {
    /// Fresh `{}` document.
    pub fn empty(projection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            projection: projection.into(),
            id: id.into(),
            data: JsonValue::Object(Map::new()),
            reference: None,
            last_applied: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn data_mut(&mut self) -> &mut JsonValue {
        &mut self.data
    }

    pub(crate) fn set_reference(&mut self, reference: Option<String>) {
        self.reference = reference;
    }

    pub(crate) fn mark_applied(&mut self, sequence_number: u64) {
        self.last_applied = sequence_number;
        self.updated_at = Utc::now();
    }
}

/// Keyed storage for projection documents (disposable read models).
pub trait DocumentStore: Send + Sync {
    fn get(&self, projection: &str, id: &str) -> Option<ProjectionDocument>;
    fn upsert(&self, document: ProjectionDocument);
    /// All documents of a projection, ordered by id.
    fn list(&self, projection: &str) -> Vec<ProjectionDocument>;
    /// Documents of a projection whose reference equals `reference`, ordered by id.
    fn list_by_reference(&self, projection: &str, reference: &str) -> Vec<ProjectionDocument>;
    /// Drop every document of a projection (rebuild support).
    fn clear(&self, projection: &str);
}

impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    fn get(&self, projection: &str, id: &str) -> Option<ProjectionDocument> {
        (**self).get(projection, id)
    }

    fn upsert(&self, document: ProjectionDocument) {
        (**self).upsert(document)
    }

    fn list(&self, projection: &str) -> Vec<ProjectionDocument> {
        (**self).list(projection)
    }

    fn list_by_reference(&self, projection: &str, reference: &str) -> Vec<ProjectionDocument> {
        (**self).list_by_reference(projection, reference)
    }

    fn clear(&self, projection: &str) {
        (**self).clear(projection)
    }
}

#[derive(Debug, Default)]
struct Collection {
    documents: BTreeMap<String, ProjectionDocument>,
    by_reference: HashMap<String, BTreeSet<String>>,
}

impl Collection {
    fn unindex(&mut self, reference: &str, id: &str) {
        if let Some(ids) = self.by_reference.get_mut(reference) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_reference.remove(reference);
            }
        }
    }
}

/// In-memory document store for tests/dev, with a secondary index on the
/// reference key.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<HashMap<String, Collection>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, projection: &str, id: &str) -> Option<ProjectionDocument> {
        let map = self.inner.read().ok()?;
        map.get(projection)?.documents.get(id).cloned()
    }

    fn upsert(&self, document: ProjectionDocument) {
        let Ok(mut map) = self.inner.write() else {
            return;
        };
        let collection = map.entry(document.projection.clone()).or_default();

        let previous = collection
            .documents
            .get(&document.id)
            .and_then(|d| d.reference.clone());
        if let Some(previous) = previous {
            collection.unindex(&previous, &document.id);
        }
        if let Some(reference) = &document.reference {
            collection
                .by_reference
                .entry(reference.clone())
                .or_default()
                .insert(document.id.clone());
        }

        collection.documents.insert(document.id.clone(), document);
    }

    fn list(&self, projection: &str) -> Vec<ProjectionDocument> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.get(projection)
            .map(|c| c.documents.values().cloned().collect())
            .unwrap_or_default()
    }

    fn list_by_reference(&self, projection: &str, reference: &str) -> Vec<ProjectionDocument> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        let Some(collection) = map.get(projection) else {
            return vec![];
        };

        collection
            .by_reference
            .get(reference)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| collection.documents.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear(&self, projection: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(projection);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(id: &str, reference: Option<&str>) -> ProjectionDocument {
        let mut d = ProjectionDocument::empty("lists", id);
        d.set_reference(reference.map(str::to_string));
        d
    }

    #[test]
    fn upsert_replaces_and_get_returns_latest() {
        let store = InMemoryDocumentStore::new();
        store.upsert(doc("a", None));

        let mut updated = doc("a", None);
        *updated.data_mut() = json!({ "name": "Groceries" });
        updated.mark_applied(3);
        store.upsert(updated);

        let got = store.get("lists", "a").unwrap();
        assert_eq!(got.data(), &json!({ "name": "Groceries" }));
        assert_eq!(got.last_applied(), 3);
        assert!(store.get("lists", "b").is_none());
        assert!(store.get("games", "a").is_none());
    }

    #[test]
    fn list_is_ordered_by_id() {
        let store = InMemoryDocumentStore::new();
        store.upsert(doc("c", None));
        store.upsert(doc("a", None));
        store.upsert(doc("b", None));

        let ids: Vec<String> = store.list("lists").iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn reference_index_follows_updates() {
        let store = InMemoryDocumentStore::new();
        store.upsert(doc("a", Some("EMPTY")));
        store.upsert(doc("b", Some("EMPTY")));
        store.upsert(doc("a", Some("IN_PROGRESS")));

        let empty: Vec<String> = store
            .list_by_reference("lists", "EMPTY")
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(empty, vec!["b"]);
        assert_eq!(store.list_by_reference("lists", "IN_PROGRESS").len(), 1);
        assert!(store.list_by_reference("lists", "COMPLETED").is_empty());
    }

    #[test]
    fn clear_drops_only_one_projection() {
        let store = InMemoryDocumentStore::new();
        store.upsert(doc("a", Some("EMPTY")));
        store.upsert(ProjectionDocument::empty("games", "g"));

        store.clear("lists");
        assert!(store.list("lists").is_empty());
        assert!(store.list_by_reference("lists", "EMPTY").is_empty());
        assert_eq!(store.list("games").len(), 1);
    }
}
