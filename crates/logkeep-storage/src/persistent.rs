//! redb-backed store
//!
//! Records live in a single table keyed by a monotonically increasing id.
//! One session is one redb write transaction, so commit and rollback map
//! directly onto `commit()` and `abort()`, and a dropped session aborts.

use std::path::PathBuf;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction};
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::record::LogRecord;
use crate::{LogStore, StoreSession};

// Key: record id, Value: postcard-encoded LogRecord
const LOG_RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("log_records");

/// Configuration for the redb store
#[derive(Debug, Clone)]
pub struct RedbStoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
}

impl Default for RedbStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./logs/logkeep.redb"),
        }
    }
}

/// Durable [`LogStore`] on top of redb
pub struct RedbLogStore {
    db: Database,
    config: RedbStoreConfig,
}

impl RedbLogStore {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: RedbStoreConfig) -> Result<Self, StorageError> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&config.db_path)
            .map_err(|e| StorageError::database(e.to_string()))?;
        info!("Opened log record database");

        let store = Self { db, config };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StorageError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::database(e.to_string()))?;
        write_txn
            .open_table(LOG_RECORDS)
            .map_err(|e| StorageError::database(e.to_string()))?;
        write_txn
            .commit()
            .map_err(|e| StorageError::database(e.to_string()))?;

        debug!("Initialized log record table");
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &RedbStoreConfig {
        &self.config
    }
}

impl LogStore for RedbLogStore {
    fn acquire_session(&self) -> Result<Box<dyn StoreSession + '_>, StorageError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::database(e.to_string()))?;
        Ok(Box::new(RedbSession { txn }))
    }

    fn len(&self) -> Result<usize, StorageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StorageError::database(e.to_string()))?;
        let table = read_txn
            .open_table(LOG_RECORDS)
            .map_err(|e| StorageError::database(e.to_string()))?;
        let len = table
            .len()
            .map_err(|e| StorageError::database(e.to_string()))?;
        Ok(len as usize)
    }

    fn recent(&self, limit: usize) -> Result<Vec<(u64, LogRecord)>, StorageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StorageError::database(e.to_string()))?;
        let table = read_txn
            .open_table(LOG_RECORDS)
            .map_err(|e| StorageError::database(e.to_string()))?;

        let mut records = Vec::with_capacity(limit);
        for entry in table
            .iter()
            .map_err(|e| StorageError::database(e.to_string()))?
            .rev()
            .take(limit)
        {
            let (key, value) = entry.map_err(|e| StorageError::database(e.to_string()))?;
            records.push((key.value(), LogRecord::from_bytes(value.value())?));
        }
        records.reverse();
        Ok(records)
    }
}

struct RedbSession {
    txn: WriteTransaction,
}

impl StoreSession for RedbSession {
    fn append(&mut self, record: &LogRecord) -> Result<u64, StorageError> {
        let bytes = record.to_bytes()?;
        let mut table = self
            .txn
            .open_table(LOG_RECORDS)
            .map_err(|e| StorageError::database(e.to_string()))?;

        let id = match table
            .last()
            .map_err(|e| StorageError::database(e.to_string()))?
        {
            Some((key, _)) => key.value() + 1,
            None => 0,
        };
        table
            .insert(id, bytes.as_slice())
            .map_err(|e| StorageError::database(e.to_string()))?;
        Ok(id)
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.txn
            .commit()
            .map_err(|e| StorageError::database(e.to_string()))
    }

    fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.txn
            .abort()
            .map_err(|e| StorageError::database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_record;
    use crate::with_session;
    use tempfile::TempDir;

    fn create_test_store() -> (RedbLogStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStoreConfig {
            db_path: temp_dir.path().join("nested").join("logs.redb"),
        };
        let store = RedbLogStore::open(config).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let (store, _temp) = create_test_store();

        let first = with_session(&store, |s| s.append(&sample_record("one"))).unwrap();
        let second = with_session(&store, |s| s.append(&sample_record("two"))).unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let (store, _temp) = create_test_store();

        let mut session = store.acquire_session().unwrap();
        session.append(&sample_record("discarded")).unwrap();
        session.rollback().unwrap();

        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_dropped_session_aborts() {
        let (store, _temp) = create_test_store();
        {
            let mut session = store.acquire_session().unwrap();
            session.append(&sample_record("dropped")).unwrap();
        }
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_recent_is_oldest_first() {
        let (store, _temp) = create_test_store();
        for i in 0..10 {
            with_session(&store, |s| s.append(&sample_record(&format!("m{i}")))).unwrap();
        }

        let recent = store.recent(3).unwrap();
        let messages: Vec<_> = recent.iter().map(|(_, r)| r.message.as_str()).collect();
        assert_eq!(messages, vec!["m7", "m8", "m9"]);
        assert_eq!(recent[0].0, 7);
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStoreConfig {
            db_path: temp_dir.path().join("logs.redb"),
        };

        {
            let store = RedbLogStore::open(config.clone()).unwrap();
            with_session(&store, |s| s.append(&sample_record("persisted"))).unwrap();
        }

        let store = RedbLogStore::open(config).unwrap();
        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].1.message, "persisted");
    }
}
