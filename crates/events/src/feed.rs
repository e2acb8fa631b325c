use serde::{Deserialize, Serialize};

use replaykit_core::AggregateId;

use crate::EventEnvelope;

/// One committed append batch on a per-aggregate-type feed.
///
/// Feeds are the subscription side of the event log: every successful append
/// for an aggregate type becomes exactly one entry, in append order. The
/// entry's `sequence_number` is its position on the feed (starting at 1),
/// which makes a feed restartable from any previously seen position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    sequence_number: u64,
    feed: String,
    aggregate_id: AggregateId,
    events: Vec<EventEnvelope>,
}

impl FeedEntry {
    pub fn new(
        sequence_number: u64,
        feed: impl Into<String>,
        aggregate_id: AggregateId,
        events: Vec<EventEnvelope>,
    ) -> Self {
        Self {
            sequence_number,
            feed: feed.into(),
            aggregate_id,
            events,
        }
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn events(&self) -> &[EventEnvelope] {
        &self.events
    }
}

/// Consumes feed entries (projections, printers, workers).
///
/// Delivery is at-least-once: the same entry may be handed over again after a
/// failure or a restart. [`crate::FeedRunner`] filters out positions it has
/// already seen, but handlers that keep their own state should still tolerate
/// re-delivery.
pub trait FeedEntryHandler {
    type Error: core::fmt::Debug;

    fn handle(&mut self, entry: &FeedEntry) -> Result<(), Self::Error>;
}

impl<F, E> FeedEntryHandler for F
where
    F: FnMut(&FeedEntry) -> Result<(), E>,
    E: core::fmt::Debug,
{
    type Error = E;

    fn handle(&mut self, entry: &FeedEntry) -> Result<(), Self::Error> {
        self(entry)
    }
}
