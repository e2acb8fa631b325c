//! Aggregate client: load, decide and save under optimistic concurrency.
//!
//! ```text
//! update(id, command)
//!   ↓
//! 1. Read the stream from the event log
//!   ↓
//! 2. Validate it (aggregate id, contiguous sequence numbers from 1)
//!   ↓
//! 3. Replay it through the reducer; the stream length is the expected version
//!   ↓
//! 4. Run the pure command against the rehydrated aggregate
//!   ↓
//! 5. Append the decided events with `ExpectedVersion::Exact(version)`
//! ```
//!
//! Nothing is retried here. A concurrent writer that appended between steps 1
//! and 5 makes the append fail with [`ClientError::Concurrency`]; callers
//! decide whether to reload and run the command again.

use std::marker::PhantomData;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use replaykit_core::{Aggregate, AggregateId, DomainError, DomainResult, ExpectedVersion};
use replaykit_events::{CodecError, ConfigurationError, DomainEvent, EventEnvelope, Reducer, ReplayError};

use crate::event_log::{EventLog, EventLogError, NewEvent};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The command rejected the request (validation or rule violation).
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("concurrent modification of {aggregate_id}: expected version {expected}, found {actual}")]
    Concurrency {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    #[error("aggregate {0} not found")]
    NotFound(AggregateId),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("failed to decode stored event: {0}")]
    Codec(CodecError),

    #[error("corrupt stream for {aggregate_id}: {reason}")]
    CorruptStream { aggregate_id: AggregateId, reason: String },

    #[error("transient event log failure: {0}")]
    Transient(EventLogError),

    #[error("event log rejected the request: {0}")]
    Log(EventLogError),
}

impl ClientError {
    /// Whether the same call may succeed if issued again (after a reload for
    /// concurrency conflicts).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Concurrency { .. } | ClientError::Transient(_))
    }

    fn from_log(aggregate_id: AggregateId, err: EventLogError) -> Self {
        match err {
            EventLogError::Concurrency { expected, actual } => ClientError::Concurrency {
                aggregate_id,
                expected: expected.as_version(),
                actual,
            },
            err if err.is_transient() => ClientError::Transient(err),
            err => ClientError::Log(err),
        }
    }
}

impl From<ReplayError> for ClientError {
    fn from(value: ReplayError) -> Self {
        match value {
            ReplayError::Configuration(err) => ClientError::Configuration(err),
            ReplayError::Decode { source, .. } => ClientError::Codec(source),
        }
    }
}

/// Rehydrated state plus the version the next append must expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<S> {
    pub state: S,
    pub version: u64,
}

/// Reusable load/save/update pipeline for one aggregate type.
///
/// Generic over the event log so tests and the demo run against
/// [`crate::event_log::InMemoryEventLog`] while a remote log can be plugged in
/// behind the same trait.
pub struct AggregateClient<L, A>
where
    A: Aggregate,
{
    log: L,
    reducer: Reducer<A::State, A::Event>,
    request_timeout: Duration,
    _aggregate: PhantomData<fn() -> A>,
}

impl<L, A> AggregateClient<L, A>
where
    L: EventLog,
    A: Aggregate,
    A::Event: DomainEvent,
{
    pub fn new(log: L, reducer: Reducer<A::State, A::Event>, request_timeout: Duration) -> Self {
        Self {
            log,
            reducer,
            request_timeout,
            _aggregate: PhantomData,
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        A::AGGREGATE_TYPE
    }

    /// Rebuild the current state of `aggregate_id`.
    ///
    /// A stream that does not exist loads as the default state at version 0.
    pub fn load(&self, aggregate_id: AggregateId) -> Result<Loaded<A::State>, ClientError> {
        let history = self
            .log
            .read(A::AGGREGATE_TYPE, aggregate_id, 0, self.request_timeout)
            .map_err(|e| ClientError::from_log(aggregate_id, e))?;
        validate_loaded_stream(aggregate_id, &history)?;

        let state = self.reducer.replay_envelopes(&history)?;
        let version = history.len() as u64;

        debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            %aggregate_id,
            version,
            "loaded aggregate"
        );

        Ok(Loaded { state, version })
    }

    pub fn exists(&self, aggregate_id: AggregateId) -> Result<bool, ClientError> {
        let head = self
            .log
            .read(A::AGGREGATE_TYPE, aggregate_id, 0, self.request_timeout)
            .map_err(|e| ClientError::from_log(aggregate_id, e))?;
        Ok(!head.is_empty())
    }

    /// Append the first events of a new stream.
    ///
    /// Fails with [`ClientError::Concurrency`] if the stream already exists.
    pub fn save(
        &self,
        aggregate_id: AggregateId,
        events: Vec<A::Event>,
    ) -> Result<Vec<EventEnvelope>, ClientError> {
        self.append(aggregate_id, ExpectedVersion::NoStream, &events)
    }

    /// Decide against the default state and save the outcome as a new stream.
    pub fn create<F>(&self, aggregate_id: AggregateId, command: F) -> Result<Vec<EventEnvelope>, ClientError>
    where
        F: FnOnce(&A) -> DomainResult<Vec<A::Event>>,
    {
        let aggregate = A::from_state(A::State::default());
        let events = command(&aggregate)?;
        self.save(aggregate_id, events)
    }

    /// Load, decide and append against the loaded version.
    ///
    /// A command that decides nothing leaves the log untouched and returns no
    /// envelopes.
    pub fn update<F>(&self, aggregate_id: AggregateId, command: F) -> Result<Vec<EventEnvelope>, ClientError>
    where
        F: FnOnce(&A) -> DomainResult<Vec<A::Event>>,
    {
        let Loaded { state, version } = self.load(aggregate_id)?;
        if version == 0 {
            return Err(ClientError::NotFound(aggregate_id));
        }

        let aggregate = A::from_state(state);
        let events = command(&aggregate)?;
        self.append(aggregate_id, ExpectedVersion::Exact(version), &events)
    }

    fn append(
        &self,
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, ClientError> {
        if events.is_empty() {
            debug!(
                aggregate_type = A::AGGREGATE_TYPE,
                %aggregate_id,
                "command decided no events"
            );
            return Ok(vec![]);
        }

        let new_events = events
            .iter()
            .map(NewEvent::from_typed)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ClientError::Log)?;

        let committed = self
            .log
            .append(
                A::AGGREGATE_TYPE,
                aggregate_id,
                expected,
                new_events,
                self.request_timeout,
            )
            .map_err(|e| ClientError::from_log(aggregate_id, e))?;

        info!(
            aggregate_type = A::AGGREGATE_TYPE,
            %aggregate_id,
            appended = committed.len(),
            version = committed.last().map(|e| e.sequence_number()).unwrap_or(0),
            "appended events"
        );

        Ok(committed)
    }
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[EventEnvelope]) -> Result<(), ClientError> {
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id() != aggregate_id {
            return Err(ClientError::CorruptStream {
                aggregate_id,
                reason: format!("wrong aggregate_id at index {idx}"),
            });
        }
        let expected = idx as u64 + 1;
        if e.sequence_number() != expected {
            return Err(ClientError::CorruptStream {
                aggregate_id,
                reason: format!(
                    "expected sequence_number {expected} at index {idx}, found {}",
                    e.sequence_number()
                ),
            });
        }
    }
    Ok(())
}
