use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use replaykit_events::{FeedCursor, FeedEntryHandler, FeedRunner};

use crate::config::EngineConfig;
use crate::event_log::EventLog;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<FeedCursor>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// Returns the cursor the worker stopped at, to resume from later.
    pub fn shutdown(mut self) -> Option<FeedCursor> {
        let _ = self.shutdown.send(());
        self.join.take().and_then(|j| j.join().ok())
    }
}

/// Generic feed worker loop.
///
/// - Polls one feed of the event log
/// - Hands entries to a [`FeedRunner`] (re-deliveries skipped, gaps rejected)
/// - Retries a failed entry on the next tick
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread consuming the feed of `cursor` from its position.
    ///
    /// `handler` must tolerate at-least-once delivery.
    pub fn spawn<L, H>(
        name: &'static str,
        log: L,
        cursor: FeedCursor,
        config: &EngineConfig,
        handler: H,
    ) -> io::Result<WorkerHandle>
    where
        L: EventLog + 'static,
        H: FeedEntryHandler + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let config = config.clone();
        let runner = FeedRunner::resume(cursor, handler);

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, log, runner, &config, shutdown_rx))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<L, H>(
    name: &'static str,
    log: L,
    mut runner: FeedRunner<H>,
    config: &EngineConfig,
    shutdown_rx: mpsc::Receiver<()>,
) -> FeedCursor
where
    L: EventLog,
    H: FeedEntryHandler,
{
    loop {
        let cursor = runner.cursor();
        let caught_up = match log.read_feed(
            cursor.feed(),
            cursor.last_sequence_number(),
            config.feed_batch_size,
            config.request_timeout,
        ) {
            Ok(batch) if batch.is_empty() => true,
            Ok(batch) => match runner.run(&batch) {
                Ok(applied) => {
                    debug!(worker = name, applied, "processed feed batch");
                    false
                }
                Err(err) => {
                    warn!(worker = name, error = %err, "projection worker handler failed");
                    true
                }
            },
            Err(err) => {
                warn!(worker = name, error = %err, "projection worker failed to read feed");
                true
            }
        };

        // Sleep only when there is nothing left to read; wake early on shutdown.
        let wait = if caught_up {
            config.feed_poll_interval
        } else {
            Duration::ZERO
        };
        match shutdown_rx.recv_timeout(wait) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
        }
    }

    runner.cursor().clone()
}
