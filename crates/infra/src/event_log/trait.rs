use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use replaykit_core::{AggregateId, EventId, ExpectedVersion};
use replaykit_events::{DomainEvent, EventEnvelope, FeedEntry, encode};

/// An event ready to be appended (not yet assigned a sequence number).
///
/// Build one from a typed domain event with [`NewEvent::from_typed`]; the log
/// assigns the sequence number and the recording time during append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub data: JsonValue,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, data: JsonValue) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            data,
        }
    }

    /// Encode a typed event into its stored `(event_type, data)` form.
    pub fn from_typed<E: DomainEvent>(event: &E) -> Result<Self, EventLogError> {
        let (event_type, data) =
            encode(event).map_err(|e| EventLogError::InvalidAppend(e.to_string()))?;
        Ok(Self::new(event_type, data))
    }
}

/// Event log operation error.
///
/// `Timeout` and `Unavailable` are transient: the same request may succeed
/// when retried. Everything else is deterministic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventLogError {
    #[error("optimistic concurrency check failed (expected {expected:?}, found {actual})")]
    Concurrency { expected: ExpectedVersion, actual: u64 },

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event log request timed out after {0:?}")]
    Timeout(Duration),

    #[error("event log unavailable: {0}")]
    Unavailable(String),
}

impl EventLogError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EventLogError::Timeout(_) | EventLogError::Unavailable(_))
    }
}

/// Append-only, per-aggregate event log with per-aggregate-type feeds.
///
/// ## Append semantics
///
/// `append()`:
/// - checks `expected` against the current stream version (number of events)
/// - assigns sequence numbers `current + 1 ..` in the order given
/// - persists the batch atomically and publishes it as one feed entry on the
///   feed named `aggregate_type`
///
/// An empty batch is a no-op and returns no envelopes.
///
/// ## Read semantics
///
/// `read()` returns the events of a stream with a sequence number greater
/// than `from_version`, in order. A missing stream reads as empty.
///
/// `read_feed()` returns at most `limit` feed entries positioned after
/// `since`, in feed order.
///
/// Every call carries a request timeout; implementations fail with
/// [`EventLogError::Timeout`] rather than block past it.
pub trait EventLog: Send + Sync {
    fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
        timeout: Duration,
    ) -> Result<Vec<EventEnvelope>, EventLogError>;

    fn read(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        from_version: u64,
        timeout: Duration,
    ) -> Result<Vec<EventEnvelope>, EventLogError>;

    fn read_feed(
        &self,
        feed: &str,
        since: u64,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<FeedEntry>, EventLogError>;
}

impl<L> EventLog for Arc<L>
where
    L: EventLog + ?Sized,
{
    fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
        timeout: Duration,
    ) -> Result<Vec<EventEnvelope>, EventLogError> {
        (**self).append(aggregate_type, aggregate_id, expected, events, timeout)
    }

    fn read(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        from_version: u64,
        timeout: Duration,
    ) -> Result<Vec<EventEnvelope>, EventLogError> {
        (**self).read(aggregate_type, aggregate_id, from_version, timeout)
    }

    fn read_feed(
        &self,
        feed: &str,
        since: u64,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<FeedEntry>, EventLogError> {
        (**self).read_feed(feed, since, limit, timeout)
    }
}
