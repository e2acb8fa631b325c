use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use replaykit_core::{AggregateId, EventId};

use crate::event::{CodecError, DomainEvent, decode};

/// A sequenced event as returned by the event log.
///
/// Notes:
/// - **Append-only**: `sequence_number` is assigned by the log at append time,
///   starts at 1 and increases by one per event within an aggregate stream.
/// - `data` is the domain-agnostic JSON payload; [`EventEnvelope::decode`]
///   turns it back into a typed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    event_id: EventId,

    aggregate_id: AggregateId,
    aggregate_type: String,

    /// Position in the aggregate stream.
    sequence_number: u64,

    event_type: String,
    data: JsonValue,
    recorded_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(
        event_id: EventId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        data: JsonValue,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event_type.into(),
            data,
            recorded_at,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn decode<E: DomainEvent>(&self) -> Result<E, CodecError> {
        decode(&self.event_type, &self.data)
    }
}
