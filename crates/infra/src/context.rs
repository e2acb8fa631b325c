//! Explicit engine context, built once at startup and passed to every
//! command and query path.

use std::io;
use std::sync::Arc;

use replaykit_core::Aggregate;
use replaykit_events::{DomainEvent, FeedCursor, FeedEntry, Reducer};

use crate::aggregate_client::AggregateClient;
use crate::config::EngineConfig;
use crate::event_log::{EventLog, InMemoryEventLog};
use crate::projections::{
    DocumentStore, InMemoryDocumentStore, ProjectionDefinition, ProjectionEngine, ProjectionError,
    ProjectionQueryService, ProjectionRegistry, Registration,
};
use crate::workers::{ProjectionWorker, WorkerHandle};

pub struct EngineContext<L, S> {
    config: EngineConfig,
    log: L,
    engine: Arc<ProjectionEngine<S>>,
    queries: ProjectionQueryService<S>,
}

impl EngineContext<Arc<InMemoryEventLog>, Arc<InMemoryDocumentStore>> {
    /// Context over the in-memory log and document store.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryEventLog::new()),
            Arc::new(InMemoryDocumentStore::new()),
        )
    }
}

impl<L, S> EngineContext<L, S>
where
    L: EventLog + Clone + 'static,
    S: DocumentStore + Clone + 'static,
{
    pub fn new(config: EngineConfig, log: L, store: S) -> Self {
        let registry = Arc::new(ProjectionRegistry::new());
        Self {
            config,
            log,
            engine: Arc::new(ProjectionEngine::new(registry.clone(), store.clone())),
            queries: ProjectionQueryService::new(registry, store),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn engine(&self) -> &Arc<ProjectionEngine<S>> {
        &self.engine
    }

    pub fn projections(&self) -> &ProjectionQueryService<S> {
        &self.queries
    }

    /// Client for aggregate type `A`, sharing the context's log and timeout.
    pub fn aggregate_client<A>(&self, reducer: Reducer<A::State, A::Event>) -> AggregateClient<L, A>
    where
        A: Aggregate,
        A::Event: DomainEvent,
    {
        AggregateClient::new(self.log.clone(), reducer, self.config.request_timeout)
    }

    pub fn register_projection(&self, definition: ProjectionDefinition) -> Registration {
        self.engine.registry().create_or_update(definition)
    }

    /// Apply everything appended to `feed` since the previous call.
    pub fn catch_up(&self, feed: &str) -> Result<usize, ProjectionError> {
        self.engine.catch_up(&self.log, feed, &self.config)
    }

    /// Keep the projections of `feed` up to date on a background thread.
    pub fn spawn_projection_worker(&self, name: &'static str, feed: &str) -> io::Result<WorkerHandle> {
        let engine = self.engine.clone();
        ProjectionWorker::spawn(
            name,
            self.log.clone(),
            FeedCursor::start(feed),
            &self.config,
            move |entry: &FeedEntry| engine.apply_entry(entry),
        )
    }
}
