//! `replaykit-events`: events, the state reducer and feed consumption.
//!
//! Everything here is deterministic and free of IO: the remote log and the
//! projection store live in `replaykit-infra`.

pub mod envelope;
pub mod event;
pub mod feed;
pub mod reducer;
pub mod runner;

pub use envelope::EventEnvelope;
pub use event::{CodecError, DomainEvent, decode, encode};
pub use feed::{FeedEntry, FeedEntryHandler};
pub use reducer::{ConfigurationError, FoldFn, Reducer, ReducerBuilder, ReplayError};
pub use runner::{FeedCursor, FeedError, FeedOutcome, FeedRunner};
