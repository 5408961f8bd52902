//! # logkeep storage
//!
//! The persistence collaborator behind the logkeep async sink.
//!
//! Stores hand out scoped sessions: everything appended through a session
//! becomes durable on [`StoreSession::commit`] and is discarded on
//! [`StoreSession::rollback`] or when the session is dropped uncommitted.
//! [`with_session`] wraps that contract so callers cannot forget either path.
//!
//! ## Backends
//!
//! - **InMemoryLogStore**: records in memory, with fault injection for tests
//! - **RedbLogStore**: durable storage in a single redb table
//!
//! ## Example
//!
//! ```rust,ignore
//! use logkeep_storage::{with_session, InMemoryLogStore, LogStore};
//!
//! let store = InMemoryLogStore::new();
//! let id = with_session(&store, |session| session.append(&record))?;
//! assert_eq!(store.len()?, 1);
//! ```

pub mod error;
pub mod memory;
pub mod persistent;
pub mod record;

pub use error::StorageError;
pub use memory::InMemoryLogStore;
pub use persistent::{RedbLogStore, RedbStoreConfig};
pub use record::LogRecord;

use tracing::warn;

/// A durable destination for log records
///
/// Implementations must be usable from the sink worker thread while other
/// threads read from them, hence `Send + Sync`.
pub trait LogStore: Send + Sync {
    /// Begin a new session
    ///
    /// The session is bound to one unit of work; see [`with_session`].
    fn acquire_session(&self) -> Result<Box<dyn StoreSession + '_>, StorageError>;

    /// Number of committed records
    fn len(&self) -> Result<usize, StorageError>;

    /// Whether no record has been committed yet
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// The most recent committed records, oldest first, paired with their ids
    fn recent(&self, limit: usize) -> Result<Vec<(u64, LogRecord)>, StorageError>;
}

/// A unit of work against a [`LogStore`]
///
/// Dropping a session without calling [`commit`](StoreSession::commit)
/// discards every append made through it.
pub trait StoreSession {
    /// Stage a record, returning the id it will have once committed
    fn append(&mut self, record: &LogRecord) -> Result<u64, StorageError>;

    /// Make all staged records durable
    fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Discard all staged records
    fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// Run `f` inside a session, committing on `Ok` and rolling back on `Err`
///
/// The session is released on every exit path. If `f` panics the session is
/// dropped during unwinding, which discards its writes.
pub fn with_session<T, F>(store: &dyn LogStore, f: F) -> Result<T, StorageError>
where
    F: FnOnce(&mut dyn StoreSession) -> Result<T, StorageError>,
{
    let mut session = store.acquire_session()?;

    match f(&mut *session) {
        Ok(value) => {
            session.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = session.rollback() {
                warn!(error = %rollback_err, "Session rollback failed");
            }
            Err(err)
        }
    }
}
