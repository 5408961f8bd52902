//! In-memory store
//!
//! Suitable for tests and simulation. Besides holding records it can be told
//! to fail or to slow down, which is how the sink's failure isolation is
//! exercised.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::StorageError;
use crate::record::LogRecord;
use crate::{LogStore, StoreSession};

/// In-memory implementation of [`LogStore`]
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    records: Mutex<Vec<LogRecord>>,
    /// Every append fails while set
    failing: AtomicBool,
    /// Number of upcoming appends that fail
    fail_budget: AtomicUsize,
    /// Artificial delay per append
    latency: Option<Duration>,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

impl InMemoryLogStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose appends each take `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Make every append fail until called again with `false`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the next `count` appends fail
    pub fn fail_next(&self, count: usize) {
        self.fail_budget.store(count, Ordering::SeqCst);
    }

    /// Snapshot of all committed records, in commit order
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Number of sessions that committed
    pub fn committed_sessions(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    /// Number of sessions rolled back, explicitly or by being dropped
    pub fn rolled_back_sessions(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl LogStore for InMemoryLogStore {
    fn acquire_session(&self) -> Result<Box<dyn StoreSession + '_>, StorageError> {
        Ok(Box::new(InMemorySession {
            store: self,
            staged: Vec::new(),
            finished: false,
        }))
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.records.lock().len())
    }

    fn recent(&self, limit: usize) -> Result<Vec<(u64, LogRecord)>, StorageError> {
        let records = self.records.lock();
        let start = records.len().saturating_sub(limit);
        Ok(records[start..]
            .iter()
            .enumerate()
            .map(|(offset, record)| ((start + offset) as u64, record.clone()))
            .collect())
    }
}

struct InMemorySession<'a> {
    store: &'a InMemoryLogStore,
    staged: Vec<LogRecord>,
    finished: bool,
}

impl StoreSession for InMemorySession<'_> {
    fn append(&mut self, record: &LogRecord) -> Result<u64, StorageError> {
        if let Some(latency) = self.store.latency {
            std::thread::sleep(latency);
        }
        if self.store.should_fail() {
            return Err(StorageError::injected("append"));
        }

        let id = (self.store.records.lock().len() + self.staged.len()) as u64;
        self.staged.push(record.clone());
        trace!(id, "Staged record");
        Ok(id)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        let staged = std::mem::take(&mut self.staged);
        self.store.records.lock().extend(staged);
        self.store.committed.fetch_add(1, Ordering::SeqCst);
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        self.staged.clear();
        self.store.rolled_back.fetch_add(1, Ordering::SeqCst);
        self.finished = true;
        Ok(())
    }
}

impl Drop for InMemorySession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_record;
    use crate::with_session;

    #[test]
    fn test_commit_makes_records_visible() {
        let store = InMemoryLogStore::new();

        let mut session = store.acquire_session().unwrap();
        session.append(&sample_record("a")).unwrap();
        session.append(&sample_record("b")).unwrap();
        assert_eq!(store.len().unwrap(), 0);

        session.commit().unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.records()[1].message, "b");
    }

    #[test]
    fn test_dropped_session_rolls_back() {
        let store = InMemoryLogStore::new();
        {
            let mut session = store.acquire_session().unwrap();
            session.append(&sample_record("lost")).unwrap();
        }
        assert!(store.is_empty().unwrap());
        assert_eq!(store.rolled_back_sessions(), 1);
    }

    #[test]
    fn test_fail_next_is_consumed() {
        let store = InMemoryLogStore::new();
        store.fail_next(2);

        for _ in 0..2 {
            let result = with_session(&store, |s| s.append(&sample_record("x")));
            assert!(matches!(result, Err(StorageError::Injected(_))));
        }
        with_session(&store, |s| s.append(&sample_record("y"))).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.rolled_back_sessions(), 2);
    }

    #[test]
    fn test_set_failing_until_cleared() {
        let store = InMemoryLogStore::new();
        store.set_failing(true);
        assert!(with_session(&store, |s| s.append(&sample_record("x"))).is_err());
        assert!(with_session(&store, |s| s.append(&sample_record("x"))).is_err());

        store.set_failing(false);
        assert!(with_session(&store, |s| s.append(&sample_record("x"))).is_ok());
    }

    #[test]
    fn test_recent_returns_tail_with_ids() {
        let store = InMemoryLogStore::new();
        for i in 0..5 {
            with_session(&store, |s| s.append(&sample_record(&format!("m{i}")))).unwrap();
        }

        let recent = store.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].0, 3);
        assert_eq!(recent[0].1.message, "m3");
        assert_eq!(recent[1].1.message, "m4");
    }
}
