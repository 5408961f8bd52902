//! Asynchronous store-backed sink
//!
//! Producers hand events to [`AsyncSink::submit`], which only enqueues. A
//! single worker thread drains the queue and persists each event through
//! its own store session, so neither store latency nor store failures ever
//! reach the producer.
//!
//! Shutdown is cooperative: [`AsyncSink::close`] revokes submission, sends a
//! stop sentinel behind everything already queued, and joins the worker.
//! There is no timeout around a store call; a store that hangs holds the
//! worker (and therefore `close`) until it returns.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use logkeep_storage::{LogRecord, LogStore, with_session};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{LogError, SubmitError};
use crate::event::LogEvent;
use crate::outputs::EventSink;

const DEFAULT_WORKER_NAME: &str = "logkeep-sink";

enum SinkMessage {
    Event(Box<LogEvent>),
    Stop,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of sink activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Events accepted by `submit`
    pub submitted: u64,
    /// Events committed to the store
    pub persisted: u64,
    /// Events dropped after a store error or panic
    pub failed: u64,
}

impl SinkStats {
    /// Events accepted but not yet handled by the worker
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.persisted)
            .saturating_sub(self.failed)
    }
}

/// Decouples log producers from a [`LogStore`]
///
/// Any number of threads may submit concurrently; exactly one worker thread
/// persists, in enqueue order. Dropping an open sink closes it.
pub struct AsyncSink {
    name: String,
    sender: RwLock<Option<mpsc::UnboundedSender<SinkMessage>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl AsyncSink {
    /// Start a sink with the default worker name
    pub fn spawn(store: Arc<dyn LogStore>) -> Result<Self, LogError> {
        Self::spawn_named(DEFAULT_WORKER_NAME, store)
    }

    /// Start a sink whose worker thread carries `name`
    pub fn spawn_named(name: impl Into<String>, store: Arc<dyn LogStore>) -> Result<Self, LogError> {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(store, receiver, worker_counters))
            .map_err(|e| LogError::Sink(format!("failed to start worker thread: {e}")))?;

        debug!(sink = %name, "Async sink started");

        Ok(Self {
            name,
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            counters,
        })
    }

    /// Queue an event for persistence
    ///
    /// Never blocks on the store. After [`close`](Self::close) the event is
    /// handed back in [`SubmitError::Closed`].
    pub fn submit(&self, event: LogEvent) -> Result<(), SubmitError> {
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return Err(SubmitError::Closed(Box::new(event)));
        };

        // Counted first so a snapshot never shows more handled than submitted
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        if sender.send(SinkMessage::Event(Box::new(event))).is_err() {
            self.counters.submitted.fetch_sub(1, Ordering::Relaxed);
            return Err(SubmitError::Disconnected);
        }
        Ok(())
    }

    /// Stop accepting events and wait until every queued event was handled
    ///
    /// Idempotent. Concurrent callers all return after the worker exited.
    pub fn close(&self) {
        let mut worker = self.worker.lock();

        // Taking the sender under the write lock orders Stop after every
        // accepted submit
        let sender = self.sender.write().take();
        if let Some(sender) = sender {
            let _ = sender.send(SinkMessage::Stop);
        }

        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!(sink = %self.name, "Async sink worker panicked");
            }
            let stats = self.stats();
            debug!(
                sink = %self.name,
                persisted = stats.persisted,
                failed = stats.failed,
                "Async sink closed"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        self.close();
    }
}

impl EventSink for AsyncSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn emit(&self, event: &LogEvent, _formatted: &str) -> Result<(), LogError> {
        self.submit(event.clone())
            .map_err(|e| LogError::Sink(e.to_string()))
    }

    fn close(&self) {
        AsyncSink::close(self);
    }
}

fn run_worker(
    store: Arc<dyn LogStore>,
    mut receiver: mpsc::UnboundedReceiver<SinkMessage>,
    counters: Arc<Counters>,
) {
    while let Some(message) = receiver.blocking_recv() {
        match message {
            SinkMessage::Event(event) => persist(store.as_ref(), &event, &counters),
            SinkMessage::Stop => break,
        }
    }

    // Exit only on an empty queue
    while let Ok(SinkMessage::Event(event)) = receiver.try_recv() {
        persist(store.as_ref(), &event, &counters);
    }
}

fn persist(store: &dyn LogStore, event: &LogEvent, counters: &Counters) {
    let record = LogRecord::from(event);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        with_session(store, |session| session.append(&record).map(|_| ()))
    }));

    match outcome {
        Ok(Ok(())) => {
            counters.persisted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                logger = event.logger_name(),
                level = %event.level(),
                error = %e,
                "Dropped log event after store failure"
            );
        }
        Err(_) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(logger = event.logger_name(), "Store panicked while persisting log event");
        }
    }
}
