//! Aggregated shipping statistics over the order feed.

use serde::{Deserialize, Serialize};

use super::definition::{DefinitionError, ProjectionDefinition, inc, push};
use super::store::ProjectionDocument;

pub const SHIPPING_STATS_PROJECTION: &str = "shipping-stats";
pub const ORDER_FEED: &str = "order";

pub fn shipping_stats_projection() -> Result<ProjectionDefinition, DefinitionError> {
    ProjectionDefinition::aggregated(SHIPPING_STATS_PROJECTION)
        .feed(ORDER_FEED)
        .on(
            "OrderShippedEvent",
            [
                push("trackingNumbers").event("$.event.trackingNumber"),
                inc("shippedOrdersCount"),
            ],
        )
        .build()
}

/// Typed view of the `shipping-stats` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingStats {
    #[serde(default)]
    pub tracking_numbers: Vec<String>,
    #[serde(default)]
    pub shipped_orders_count: u64,
}

impl ShippingStats {
    pub fn from_document(document: &ProjectionDocument) -> Result<Self, serde_json::Error> {
        serde_json::from_value(document.data().clone())
    }
}
