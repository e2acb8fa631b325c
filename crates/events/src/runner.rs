//! Feed runner: hands feed entries to a handler and tracks progress.
//!
//! The runner owns the cursor of a single feed. Positions at or below the
//! cursor are treated as re-deliveries and skipped; a position further ahead
//! than `cursor + 1` means entries were lost in transit and is rejected so the
//! caller can re-read from the cursor.

use thiserror::Error;
use tracing::debug;

use crate::{FeedEntry, FeedEntryHandler};

/// Progress of a consumer on one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCursor {
    feed: String,
    last_sequence_number: u64,
}

impl FeedCursor {
    /// Cursor positioned before the first entry of `feed`.
    pub fn start(feed: impl Into<String>) -> Self {
        Self::at(feed, 0)
    }

    pub fn at(feed: impl Into<String>, last_sequence_number: u64) -> Self {
        Self {
            feed: feed.into(),
            last_sequence_number,
        }
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("entry belongs to feed '{found}', runner consumes '{expected}'")]
    FeedMismatch { expected: String, found: String },

    #[error("gap in feed (last={last}, found={found})")]
    Gap { last: u64, found: u64 },

    #[error("feed handler failed at position {sequence_number}: {message}")]
    Handler { sequence_number: u64, message: String },
}

/// What happened to a delivered entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    Applied,
    /// Already at or below the cursor; the handler was not called.
    Duplicate,
}

#[derive(Debug)]
pub struct FeedRunner<H> {
    handler: H,
    cursor: FeedCursor,
}

impl<H> FeedRunner<H>
where
    H: FeedEntryHandler,
{
    pub fn new(feed: impl Into<String>, handler: H) -> Self {
        Self::resume(FeedCursor::start(feed), handler)
    }

    /// Continue consuming after a previously persisted cursor.
    pub fn resume(cursor: FeedCursor, handler: H) -> Self {
        Self { handler, cursor }
    }

    pub fn cursor(&self) -> &FeedCursor {
        &self.cursor
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Apply a single entry, enforcing feed identity and gap-free ordering.
    ///
    /// The cursor only advances when the handler succeeds, so a failed entry is
    /// offered again on the next delivery.
    pub fn apply(&mut self, entry: &FeedEntry) -> Result<FeedOutcome, FeedError> {
        if entry.feed() != self.cursor.feed {
            return Err(FeedError::FeedMismatch {
                expected: self.cursor.feed.clone(),
                found: entry.feed().to_string(),
            });
        }

        let last = self.cursor.last_sequence_number;
        let found = entry.sequence_number();

        if found <= last {
            debug!(feed = %self.cursor.feed, last, found, "skipping re-delivered feed entry");
            return Ok(FeedOutcome::Duplicate);
        }
        if found != last + 1 {
            return Err(FeedError::Gap { last, found });
        }

        self.handler.handle(entry).map_err(|err| FeedError::Handler {
            sequence_number: found,
            message: format!("{err:?}"),
        })?;

        self.cursor.last_sequence_number = found;
        Ok(FeedOutcome::Applied)
    }

    /// Apply many entries in order, stopping at the first error.
    pub fn run<'a>(&mut self, entries: impl IntoIterator<Item = &'a FeedEntry>) -> Result<usize, FeedError> {
        let mut applied = 0;
        for entry in entries {
            if self.apply(entry)? == FeedOutcome::Applied {
                applied += 1;
            }
        }
        Ok(applied)
    }
}
