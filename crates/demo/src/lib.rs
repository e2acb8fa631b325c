//! Demo wiring for the replaykit engine.

pub mod order_feed;

pub use order_feed::OrderFeedEntryHandler;
