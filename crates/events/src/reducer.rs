//! State reducer: folds an ordered event sequence into aggregate state.
//!
//! Handlers are registered per event type name, mirroring how the event log
//! identifies events. Registration is checked exhaustively against
//! [`DomainEvent::EVENT_TYPES`] when the reducer is built, so an event type
//! without a fold function is a configuration error at startup rather than a
//! silently skipped event during replay.

use std::collections::HashMap;

use thiserror::Error;

use crate::envelope::EventEnvelope;
use crate::event::{CodecError, DomainEvent};

/// Fold function for one event type. Must be pure: no IO, no hidden state.
pub type FoldFn<S, E> = fn(&mut S, &E);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no handler registered for event type '{0}'")]
    MissingHandler(String),

    #[error("handler registered for undeclared event type '{0}'")]
    UndeclaredEventType(String),

    #[error("more than one handler registered for event type '{0}'")]
    DuplicateHandler(String),

    #[error("unknown event type '{0}' in stream")]
    UnknownEventType(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("failed to decode event at sequence {sequence_number}: {source}")]
    Decode {
        sequence_number: u64,
        source: CodecError,
    },
}

/// Collects fold handlers before validation.
#[derive(Debug)]
pub struct ReducerBuilder<S, E> {
    handlers: Vec<(&'static str, FoldFn<S, E>)>,
}

impl<S, E> ReducerBuilder<S, E>
where
    S: Default,
    E: DomainEvent,
{
    /// Register the fold function for `event_type`.
    pub fn on(mut self, event_type: &'static str, handler: FoldFn<S, E>) -> Self {
        self.handlers.push((event_type, handler));
        self
    }

    /// Validate registration against the event enum and build the reducer.
    pub fn build(self) -> Result<Reducer<S, E>, ConfigurationError> {
        let mut handlers = HashMap::with_capacity(self.handlers.len());

        for (event_type, handler) in self.handlers {
            if !E::EVENT_TYPES.contains(&event_type) {
                return Err(ConfigurationError::UndeclaredEventType(event_type.to_string()));
            }
            if handlers.insert(event_type, handler).is_some() {
                return Err(ConfigurationError::DuplicateHandler(event_type.to_string()));
            }
        }

        if let Some(missing) = E::EVENT_TYPES.iter().find(|t| !handlers.contains_key(*t)) {
            return Err(ConfigurationError::MissingHandler(missing.to_string()));
        }

        Ok(Reducer { handlers })
    }
}

/// Validated mapping of event type → fold function.
#[derive(Debug)]
pub struct Reducer<S, E> {
    handlers: HashMap<&'static str, FoldFn<S, E>>,
}

impl<S, E> Reducer<S, E>
where
    S: Default,
    E: DomainEvent,
{
    pub fn builder() -> ReducerBuilder<S, E> {
        ReducerBuilder { handlers: Vec::new() }
    }

    /// Fold a single event into `state`.
    pub fn fold(&self, mut state: S, event: &E) -> Result<S, ReplayError> {
        let handler = self
            .handlers
            .get(event.event_type())
            .ok_or_else(|| ConfigurationError::UnknownEventType(event.event_type().to_string()))?;
        handler(&mut state, event);
        Ok(state)
    }

    /// Fold typed events in order, starting from `S::default()`.
    pub fn replay<'a>(&self, events: impl IntoIterator<Item = &'a E>) -> Result<S, ReplayError>
    where
        E: 'a,
    {
        events
            .into_iter()
            .try_fold(S::default(), |state, event| self.fold(state, event))
    }

    /// Decode and fold stored events in the order given.
    pub fn replay_envelopes(&self, envelopes: &[EventEnvelope]) -> Result<S, ReplayError> {
        envelopes.iter().try_fold(S::default(), |state, envelope| {
            let event: E = envelope.decode().map_err(|source| match source {
                CodecError::UnknownEventType(t) => ReplayError::Configuration(
                    ConfigurationError::UnknownEventType(t),
                ),
                source => ReplayError::Decode {
                    sequence_number: envelope.sequence_number(),
                    source,
                },
            })?;
            self.fold(state, &event)
        })
    }
}
