//! Prints the order feed as human-readable lines.

use std::convert::Infallible;

use serde_json::Value as JsonValue;
use tracing::info;

use replaykit_events::{EventEnvelope, FeedEntry, FeedEntryHandler};

/// Renders every order feed event through `tracing::info!`.
#[derive(Debug, Default)]
pub struct OrderFeedEntryHandler {
    handled: u64,
}

impl OrderFeedEntryHandler {
    /// Number of feed entries seen so far.
    pub fn handled(&self) -> u64 {
        self.handled
    }
}

impl FeedEntryHandler for OrderFeedEntryHandler {
    type Error = Infallible;

    fn handle(&mut self, entry: &FeedEntry) -> Result<(), Self::Error> {
        info!(sequence_number = entry.sequence_number(), "processing order feed entry");
        for event in entry.events() {
            info!(event_type = event.event_type(), "{}", render(event));
        }
        self.handled += 1;
        Ok(())
    }
}

/// One line describing `event`.
pub fn render(event: &EventEnvelope) -> String {
    let data = event.data();
    let order_id = field(data, "orderId");
    match event.event_type() {
        "OrderPlacedEvent" => format!(
            "An order with ID [{order_id}] was placed by customer [{}]",
            field(data, "customerId")
        ),
        "OrderPaidEvent" => format!(
            "The order with ID [{order_id}] was paid, amountPaid: {}, amountLeft: {}",
            field(data, "amountPaid"),
            field(data, "amountLeft")
        ),
        "OrderShippedEvent" => format!(
            "The order with ID [{order_id}] was shipped, trackingNumber: {}",
            field(data, "trackingNumber")
        ),
        "OrderCancelledEvent" => format!(
            "The order with ID [{order_id}] was cancelled, reason: {}",
            field(data, "reason")
        ),
        "PaymentReceivedEvent" => format!(
            "The order with ID [{order_id}] received payment: {}",
            field(data, "amountPaid")
        ),
        "OrderFullyPaidEvent" => format!("The order with ID [{order_id}] is fully paid"),
        other => format!("Don't know how to handle events of type: {other}"),
    }
}

// Strings print bare; missing fields print as null.
fn field(data: &JsonValue, key: &str) -> String {
    match data.get(key) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(value) => value.to_string(),
        None => "null".to_string(),
    }
}
