use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use replaykit_core::{AggregateId, ExpectedVersion};
use replaykit_events::{EventEnvelope, FeedEntry};

use super::r#trait::{EventLog, EventLogError, NewEvent};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_micros(50);

#[derive(Debug, Default)]
struct LogState {
    streams: HashMap<AggregateId, Vec<EventEnvelope>>,
    feeds: HashMap<String, Vec<FeedEntry>>,
}

/// In-memory append-only event log.
///
/// Intended for tests/dev. Not optimized for performance.
///
/// Lock acquisition honours the request timeout, and the log can be switched
/// off with [`InMemoryEventLog::set_available`] to exercise transient failure
/// paths.
#[derive(Debug)]
pub struct InMemoryEventLog {
    state: RwLock<LogState>,
    available: AtomicBool,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while unavailable every call fails with
    /// [`EventLogError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), EventLogError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EventLogError::Unavailable("event log is offline".to_string()))
        }
    }

    fn read_within(&self, timeout: Duration) -> Result<RwLockReadGuard<'_, LogState>, EventLogError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state.try_read() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(EventLogError::Unavailable("lock poisoned".to_string()));
                }
                Err(TryLockError::WouldBlock) if Instant::now() >= deadline => {
                    return Err(EventLogError::Timeout(timeout));
                }
                Err(TryLockError::WouldBlock) => thread::sleep(LOCK_RETRY_INTERVAL),
            }
        }
    }

    fn write_within(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, LogState>, EventLogError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state.try_write() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(EventLogError::Unavailable("lock poisoned".to_string()));
                }
                Err(TryLockError::WouldBlock) if Instant::now() >= deadline => {
                    return Err(EventLogError::Timeout(timeout));
                }
                Err(TryLockError::WouldBlock) => thread::sleep(LOCK_RETRY_INTERVAL),
            }
        }
    }

    fn current_version(stream: &[EventEnvelope]) -> u64 {
        stream.last().map(|e| e.sequence_number()).unwrap_or(0)
    }

    fn ensure_stream_type(
        stream: &[EventEnvelope],
        aggregate_type: &str,
    ) -> Result<(), EventLogError> {
        match stream.first() {
            Some(existing) if existing.aggregate_type() != aggregate_type => {
                Err(EventLogError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', requested '{}'",
                    existing.aggregate_type(),
                    aggregate_type
                )))
            }
            _ => Ok(()),
        }
    }
}

impl EventLog for InMemoryEventLog {
    fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
        timeout: Duration,
    ) -> Result<Vec<EventEnvelope>, EventLogError> {
        self.ensure_available()?;
        if events.is_empty() {
            return Ok(vec![]);
        }
        if aggregate_type.is_empty() {
            return Err(EventLogError::InvalidAppend("aggregate_type is empty".to_string()));
        }

        let mut guard = self.write_within(timeout)?;
        let state = &mut *guard;

        let stream = state.streams.entry(aggregate_id).or_default();
        let current = Self::current_version(stream);
        if !expected.matches(current) {
            return Err(EventLogError::Concurrency {
                expected,
                actual: current,
            });
        }
        Self::ensure_stream_type(stream, aggregate_type)?;

        let recorded_at = Utc::now();
        let committed: Vec<EventEnvelope> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, sequence_number)| {
                EventEnvelope::new(
                    e.event_id,
                    aggregate_id,
                    aggregate_type,
                    sequence_number,
                    e.event_type,
                    e.data,
                    recorded_at,
                )
            })
            .collect();
        stream.extend(committed.iter().cloned());

        let feed = state.feeds.entry(aggregate_type.to_string()).or_default();
        let position = feed.len() as u64 + 1;
        feed.push(FeedEntry::new(
            position,
            aggregate_type,
            aggregate_id,
            committed.clone(),
        ));

        debug!(
            aggregate_type,
            %aggregate_id,
            version = current + committed.len() as u64,
            feed_position = position,
            "appended batch"
        );

        Ok(committed)
    }

    fn read(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        from_version: u64,
        timeout: Duration,
    ) -> Result<Vec<EventEnvelope>, EventLogError> {
        self.ensure_available()?;
        let state = self.read_within(timeout)?;

        let Some(stream) = state.streams.get(&aggregate_id) else {
            return Ok(vec![]);
        };
        Self::ensure_stream_type(stream, aggregate_type)?;

        Ok(stream
            .iter()
            .filter(|e| e.sequence_number() > from_version)
            .cloned()
            .collect())
    }

    fn read_feed(
        &self,
        feed: &str,
        since: u64,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<FeedEntry>, EventLogError> {
        self.ensure_available()?;
        let state = self.read_within(timeout)?;

        Ok(state
            .feeds
            .get(feed)
            .map(|entries| {
                entries
                    .iter()
                    .skip(since as usize)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
