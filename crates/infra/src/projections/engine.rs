//! Projection engine: folds feed entries into projection documents.
//!
//! For every definition consuming an entry's feed, the engine looks up the
//! handler for each event type (unhandled types are ignored) and applies its
//! rules in order to a working copy of the document. The copy is written back
//! only when every rule succeeded, so a failing entry leaves the stored
//! document untouched.
//!
//! Delivery is at-least-once. Each document remembers the highest position it
//! has folded (`last_applied`): the aggregate stream sequence number for
//! single projections, the feed position for aggregated ones. Anything at or
//! below it is skipped, which keeps `prepend`, `push` and `inc` from applying
//! twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, info};

use replaykit_events::{EventEnvelope, FeedCursor, FeedEntry, FeedEntryHandler, FeedError, FeedRunner};

use super::definition::{ProjectionDefinition, ProjectionFunction, ProjectionKind, ProjectionRule, ValueSource};
use super::registry::ProjectionRegistry;
use super::selector::{Segment, TargetFilter, TargetSelector};
use super::store::{DocumentStore, ProjectionDocument};
use crate::config::EngineConfig;
use crate::event_log::{EventLog, EventLogError};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("projection '{projection}' cannot apply {event_type}: '{target}' is not {expected}")]
    TypeMismatch {
        projection: String,
        event_type: String,
        target: String,
        expected: &'static str,
    },

    #[error("unknown projection '{0}'")]
    UnknownProjection(String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Log(#[from] EventLogError),
}

/// A write performed at every location a target selector addresses.
enum Write {
    Set(JsonValue),
    Prepend(JsonValue),
    Push(JsonValue),
    Step(i64),
    Clear,
}

impl Write {
    fn creates_path(&self) -> bool {
        !matches!(self, Write::Clear)
    }

    fn apply(&self, object: &mut Map<String, JsonValue>, field: &str) -> Result<(), &'static str> {
        match self {
            Write::Set(value) => {
                object.insert(field.to_string(), value.clone());
            }
            Write::Prepend(value) => array_at(object, field)?.insert(0, value.clone()),
            Write::Push(value) => array_at(object, field)?.push(value.clone()),
            Write::Step(delta) => {
                let slot = object.entry(field).or_insert(JsonValue::from(0));
                *slot = step(slot, *delta).ok_or("a number")?;
            }
            Write::Clear => {
                object.remove(field);
            }
        }
        Ok(())
    }
}

/// Walk `segments` from `node` and perform `write` at every addressed
/// location. Errors name the shape that was expected.
fn visit(
    node: &mut JsonValue,
    segments: &[Segment],
    filter: Option<&TargetFilter>,
    event_data: &JsonValue,
    write: &Write,
) -> Result<(), &'static str> {
    if node.is_null() {
        *node = JsonValue::Object(Map::new());
    }
    let object = node.as_object_mut().ok_or("an object")?;
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };
    if !rest.is_empty() && !write.creates_path() && !object.contains_key(head.name()) {
        return Ok(());
    }

    match head {
        Segment::Field(name) if rest.is_empty() => write.apply(object, name),
        Segment::Field(name) => {
            let child = object.entry(name.clone()).or_insert(JsonValue::Null);
            visit(child, rest, filter, event_data, write)
        }
        Segment::Filtered(name) => {
            let items = array_at(object, name)?;
            for item in items.iter_mut() {
                if filter.is_some_and(|f| f.matches(item, event_data)) {
                    visit(item, rest, filter, event_data, write)?;
                }
            }
            Ok(())
        }
    }
}

fn array_at<'a>(object: &'a mut Map<String, JsonValue>, field: &str) -> Result<&'a mut Vec<JsonValue>, &'static str> {
    object
        .entry(field)
        .or_insert_with(|| JsonValue::Array(Vec::new()))
        .as_array_mut()
        .ok_or("an array")
}

fn step(current: &JsonValue, delta: i64) -> Option<JsonValue> {
    if let Some(n) = current.as_i64() {
        return n.checked_add(delta).map(JsonValue::from);
    }
    let f = current.as_f64()?;
    Number::from_f64(f + delta as f64).map(JsonValue::Number)
}

/// Read the reference key at a plain field path.
fn reference_at(data: &JsonValue, segments: &[Segment]) -> Result<Option<String>, &'static str> {
    let value = segments
        .iter()
        .try_fold(data, |node, segment| node.get(segment.name()));
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(v @ (JsonValue::Number(_) | JsonValue::Bool(_))) => Ok(Some(v.to_string())),
        Some(_) => Err("a scalar"),
    }
}

/// One event being applied to one projection.
struct Application<'a> {
    projection: &'a str,
    event: &'a EventEnvelope,
}

impl Application<'_> {
    fn mismatch(&self, target: &TargetSelector, expected: &'static str) -> ProjectionError {
        ProjectionError::TypeMismatch {
            projection: self.projection.to_string(),
            event_type: self.event.event_type().to_string(),
            target: target.to_string(),
            expected,
        }
    }

    fn resolve(&self, source: &ValueSource) -> JsonValue {
        match source {
            ValueSource::Literal(value) => value.clone(),
            ValueSource::Event(selector) => selector
                .select(self.event.data())
                .cloned()
                .unwrap_or(JsonValue::Null),
            ValueSource::EventData => self.event.data().clone(),
        }
    }

    fn apply(&self, document: &mut ProjectionDocument, rule: &ProjectionRule) -> Result<(), ProjectionError> {
        let function = rule.function();
        let target = function.target();

        let write = match function {
            ProjectionFunction::Set { value, .. } => Write::Set(self.resolve(value)),
            ProjectionFunction::Prepend { value, .. } => Write::Prepend(self.resolve(value)),
            ProjectionFunction::Push { value, .. } => Write::Push(self.resolve(value)),
            ProjectionFunction::Inc { .. } => Write::Step(1),
            ProjectionFunction::Dec { .. } => Write::Step(-1),
            ProjectionFunction::Clear { .. } => Write::Clear,
            ProjectionFunction::SetRef { .. } => {
                let reference =
                    reference_at(document.data(), target.segments()).map_err(|e| self.mismatch(target, e))?;
                document.set_reference(reference);
                return Ok(());
            }
        };

        visit(
            document.data_mut(),
            target.segments(),
            rule.filter(),
            self.event.data(),
            &write,
        )
        .map_err(|e| self.mismatch(target, e))
    }
}

/// Applies registered projection definitions to feed entries.
pub struct ProjectionEngine<S> {
    registry: Arc<ProjectionRegistry>,
    store: S,
    cursors: Mutex<HashMap<String, FeedCursor>>,
}

impl<S> ProjectionEngine<S>
where
    S: DocumentStore,
{
    pub fn new(registry: Arc<ProjectionRegistry>, store: S) -> Self {
        Self {
            registry,
            store,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ProjectionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply one feed entry to every definition consuming its feed.
    pub fn apply_entry(&self, entry: &FeedEntry) -> Result<(), ProjectionError> {
        for definition in self.registry.for_feed(entry.feed()) {
            self.apply_definition(&definition, entry)?;
        }
        Ok(())
    }

    /// Apply one feed entry to one definition. Returns whether the document
    /// changed.
    pub fn apply_definition(
        &self,
        definition: &ProjectionDefinition,
        entry: &FeedEntry,
    ) -> Result<bool, ProjectionError> {
        let kind = definition.kind();
        let id = match kind {
            ProjectionKind::Single => entry.aggregate_id().to_string(),
            ProjectionKind::Aggregated => definition.name().to_string(),
        };

        let mut document = self
            .store
            .get(definition.name(), &id)
            .unwrap_or_else(|| ProjectionDocument::empty(definition.name(), &id));
        let last_applied = document.last_applied();

        let mut applied = None;
        for event in entry.events() {
            let position = match kind {
                ProjectionKind::Single => event.sequence_number(),
                ProjectionKind::Aggregated => entry.sequence_number(),
            };
            if position <= last_applied {
                debug!(
                    projection = definition.name(),
                    document = %id,
                    position,
                    last_applied,
                    "skipping already applied event"
                );
                continue;
            }
            let Some(handler) = definition.handler(event.event_type()) else {
                continue;
            };

            let application = Application {
                projection: definition.name(),
                event,
            };
            for rule in handler.rules() {
                application.apply(&mut document, rule)?;
            }
            applied = Some(position);
        }

        match applied {
            Some(position) => {
                document.mark_applied(position);
                self.store.upsert(document);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drain `feed` from where the previous call stopped.
    ///
    /// Synchronous counterpart of the projection worker; do not run both on
    /// the same feed.
    pub fn catch_up<L: EventLog>(&self, log: &L, feed: &str, config: &EngineConfig) -> Result<usize, ProjectionError> {
        let mut cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
        let cursor = cursors
            .entry(feed.to_string())
            .or_insert_with(|| FeedCursor::start(feed));

        let mut runner = FeedRunner::resume(cursor.clone(), |entry: &FeedEntry| self.apply_entry(entry));
        let result = drain(log, &mut runner, config);
        *cursor = runner.cursor().clone();
        result
    }

    /// Recompute every document of `name` from the start of its feed.
    pub fn rebuild<L: EventLog>(&self, log: &L, name: &str, config: &EngineConfig) -> Result<usize, ProjectionError> {
        let definition = self
            .registry
            .get(name)
            .ok_or_else(|| ProjectionError::UnknownProjection(name.to_string()))?;
        self.store.clear(name);

        let mut runner = FeedRunner::new(definition.feed(), |entry: &FeedEntry| {
            self.apply_definition(&definition, entry).map(|_| ())
        });
        let entries = drain(log, &mut runner, config)?;

        info!(projection = name, entries, "rebuilt projection");
        Ok(entries)
    }

    /// Remove the definition and its documents. Returns whether it existed.
    pub fn delete_projection(&self, name: &str) -> bool {
        let existed = self.registry.delete(name);
        self.store.clear(name);
        existed
    }
}

fn drain<L, H>(log: &L, runner: &mut FeedRunner<H>, config: &EngineConfig) -> Result<usize, ProjectionError>
where
    L: EventLog,
    H: FeedEntryHandler,
{
    let mut applied = 0;
    loop {
        let cursor = runner.cursor();
        let batch = log.read_feed(
            cursor.feed(),
            cursor.last_sequence_number(),
            config.feed_batch_size,
            config.request_timeout,
        )?;
        if batch.is_empty() {
            return Ok(applied);
        }
        applied += runner.run(&batch)?;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use replaykit_core::{AggregateId, EventId};

    use super::*;
    use crate::projections::definition::{clear, dec, inc, prepend, push, set, setref};
    use crate::projections::store::InMemoryDocumentStore;

    struct Stream {
        id: AggregateId,
        next: u64,
    }

    impl Stream {
        fn new() -> Self {
            Self {
                id: AggregateId::new(),
                next: 1,
            }
        }

        fn entry(&mut self, feed_position: u64, events: &[(&str, JsonValue)]) -> FeedEntry {
            let envelopes = events
                .iter()
                .map(|(event_type, data)| {
                    let seq = self.next;
                    self.next += 1;
                    EventEnvelope::new(EventId::new(), self.id, "list", seq, *event_type, data.clone(), Utc::now())
                })
                .collect();
            FeedEntry::new(feed_position, "list", self.id, envelopes)
        }
    }

    fn engine(definition: ProjectionDefinition) -> ProjectionEngine<InMemoryDocumentStore> {
        let registry = Arc::new(ProjectionRegistry::new());
        registry.create_or_update(definition);
        ProjectionEngine::new(registry, InMemoryDocumentStore::new())
    }

    fn data(engine: &ProjectionEngine<InMemoryDocumentStore>, name: &str, id: &str) -> JsonValue {
        engine.store().get(name, id).unwrap().data().clone()
    }

    #[test]
    fn set_writes_literals_and_event_values() {
        let engine = engine(
            ProjectionDefinition::single("lists")
                .feed("list")
                .on(
                    "Created",
                    [set("name").event("$.event.name"), set("meta.status").raw("EMPTY"), set("missing").event("nope")],
                )
                .build()
                .unwrap(),
        );
        let mut stream = Stream::new();
        engine
            .apply_entry(&stream.entry(1, &[("Created", json!({ "name": "Groceries" }))]))
            .unwrap();

        assert_eq!(
            data(&engine, "lists", &stream.id.to_string()),
            json!({ "name": "Groceries", "meta": { "status": "EMPTY" }, "missing": null })
        );
    }

    #[test]
    fn prepend_and_push_keep_their_order() {
        let engine = engine(
            ProjectionDefinition::single("lists")
                .feed("list")
                .on("Added", [prepend("newest"), push("oldest").event("id")])
                .build()
                .unwrap(),
        );
        let mut stream = Stream::new();
        engine
            .apply_entry(&stream.entry(1, &[("Added", json!({ "id": 1 })), ("Added", json!({ "id": 2 }))]))
            .unwrap();

        let doc = data(&engine, "lists", &stream.id.to_string());
        assert_eq!(doc["newest"], json!([{ "id": 2 }, { "id": 1 }]));
        assert_eq!(doc["oldest"], json!([1, 2]));
    }

    #[test]
    fn filtered_set_updates_matching_elements_only() {
        let engine = engine(
            ProjectionDefinition::single("lists")
                .feed("list")
                .on("Added", [push("todos")])
                .on(
                    "Done",
                    [set("todos[?].status").raw("DONE").filter("[?(@.todoId == $.event.todoId)]")],
                )
                .build()
                .unwrap(),
        );
        let mut stream = Stream::new();
        engine
            .apply_entry(&stream.entry(
                1,
                &[
                    ("Added", json!({ "todoId": "a" })),
                    ("Added", json!({ "todoId": "b" })),
                    ("Done", json!({ "todoId": "b" })),
                ],
            ))
            .unwrap();

        assert_eq!(
            data(&engine, "lists", &stream.id.to_string())["todos"],
            json!([{ "todoId": "a" }, { "todoId": "b", "status": "DONE" }])
        );
    }

    #[test]
    fn counters_and_clear() {
        let engine = engine(
            ProjectionDefinition::single("lists")
                .feed("list")
                .on("Up", [inc("count")])
                .on("Down", [dec("count"), clear("note"), clear("absent.deep")])
                .on("Note", [set("note").raw("hi")])
                .build()
                .unwrap(),
        );
        let mut stream = Stream::new();
        engine
            .apply_entry(&stream.entry(
                1,
                &[("Up", json!({})), ("Up", json!({})), ("Note", json!({})), ("Down", json!({}))],
            ))
            .unwrap();

        assert_eq!(data(&engine, "lists", &stream.id.to_string()), json!({ "count": 1 }));
    }

    #[test]
    fn setref_indexes_documents_by_reference() {
        let engine = engine(
            ProjectionDefinition::single("lists")
                .feed("list")
                .on("Created", [set("status").raw("EMPTY"), setref("status")])
                .on("Started", [set("status").raw("IN_PROGRESS"), setref("status")])
                .build()
                .unwrap(),
        );
        let mut first = Stream::new();
        let mut second = Stream::new();
        engine.apply_entry(&first.entry(1, &[("Created", json!({}))])).unwrap();
        engine.apply_entry(&second.entry(2, &[("Created", json!({}))])).unwrap();
        engine.apply_entry(&first.entry(3, &[("Started", json!({}))])).unwrap();

        let empty = engine.store().list_by_reference("lists", "EMPTY");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].id(), second.id.to_string());
        assert_eq!(engine.store().list_by_reference("lists", "IN_PROGRESS").len(), 1);
    }

    #[test]
    fn redelivered_entries_are_not_applied_twice() {
        let engine = engine(
            ProjectionDefinition::single("lists")
                .feed("list")
                .on("Added", [prepend("todos")])
                .build()
                .unwrap(),
        );
        let mut stream = Stream::new();
        let entry = stream.entry(1, &[("Added", json!({ "id": 1 }))]);

        engine.apply_entry(&entry).unwrap();
        engine.apply_entry(&entry).unwrap();

        let doc = engine.store().get("lists", &stream.id.to_string()).unwrap();
        assert_eq!(doc.data()["todos"], json!([{ "id": 1 }]));
        assert_eq!(doc.last_applied(), 1);
    }

    #[test]
    fn aggregated_projections_dedup_by_feed_position() {
        let engine = engine(
            ProjectionDefinition::aggregated("stats")
                .feed("list")
                .on("Added", [inc("count")])
                .build()
                .unwrap(),
        );
        let mut a = Stream::new();
        let mut b = Stream::new();
        let first = a.entry(1, &[("Added", json!({})), ("Added", json!({}))]);
        let second = b.entry(2, &[("Added", json!({}))]);

        engine.apply_entry(&first).unwrap();
        engine.apply_entry(&second).unwrap();
        engine.apply_entry(&first).unwrap();

        let doc = engine.store().get("stats", "stats").unwrap();
        assert_eq!(doc.data(), &json!({ "count": 3 }));
        assert_eq!(doc.last_applied(), 2);
    }

    #[test]
    fn unhandled_event_types_are_ignored() {
        let engine = engine(
            ProjectionDefinition::single("lists")
                .feed("list")
                .on("Added", [prepend("todos")])
                .build()
                .unwrap(),
        );
        let mut stream = Stream::new();
        engine.apply_entry(&stream.entry(1, &[("Renamed", json!({}))])).unwrap();
        assert!(engine.store().get("lists", &stream.id.to_string()).is_none());
    }

    #[test]
    fn type_mismatch_leaves_the_document_untouched() {
        let engine = engine(
            ProjectionDefinition::single("lists")
                .feed("list")
                .on("Created", [set("todos").raw("not a list")])
                .on("Added", [prepend("todos")])
                .build()
                .unwrap(),
        );
        let mut stream = Stream::new();
        engine.apply_entry(&stream.entry(1, &[("Created", json!({}))])).unwrap();

        let err = engine
            .apply_entry(&stream.entry(2, &[("Added", json!({ "id": 1 }))]))
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::TypeMismatch { expected: "an array", ref target, .. } if target == "todos"
        ));

        let doc = engine.store().get("lists", &stream.id.to_string()).unwrap();
        assert_eq!(doc.data(), &json!({ "todos": "not a list" }));
        assert_eq!(doc.last_applied(), 1);
    }
}
