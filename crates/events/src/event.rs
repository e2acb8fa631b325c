use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;

/// A typed domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - a **closed set** per aggregate (one enum, one variant per event type)
/// - designed to be **append-only**
///
/// Implementations are enums serialised adjacently tagged, i.e.
/// `#[serde(tag = "type", content = "data")]`, with one struct payload per
/// variant. This makes `(event_type, data)` as stored in the log map onto
/// exactly one variant.
pub trait DomainEvent: Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Every discriminant of the enum, used to validate handler registration.
    const EVENT_TYPES: &'static [&'static str];

    /// Stable event type name (e.g. `"TodoAdded"`).
    fn event_type(&self) -> &'static str;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    #[error("malformed '{event_type}' event: {reason}")]
    Malformed { event_type: String, reason: String },
}

/// Split a typed event into its stored form: event type + JSON object payload.
pub fn encode<E: DomainEvent>(event: &E) -> Result<(String, JsonValue), CodecError> {
    let event_type = event.event_type();
    let tagged = serde_json::to_value(event).map_err(|e| CodecError::Malformed {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    })?;

    let data = match tagged {
        JsonValue::Object(mut obj) => obj.remove("data").unwrap_or(JsonValue::Object(Map::new())),
        other => {
            return Err(CodecError::Malformed {
                event_type: event_type.to_string(),
                reason: format!("expected an adjacently tagged object, got {other}"),
            });
        }
    };

    Ok((event_type.to_string(), data))
}

/// Rebuild a typed event from its stored form.
pub fn decode<E: DomainEvent>(event_type: &str, data: &JsonValue) -> Result<E, CodecError> {
    if !E::EVENT_TYPES.contains(&event_type) {
        return Err(CodecError::UnknownEventType(event_type.to_string()));
    }

    serde_json::from_value(json!({ "type": event_type, "data": data })).map_err(|e| {
        CodecError::Malformed {
            event_type: event_type.to_string(),
            reason: e.to_string(),
        }
    })
}
