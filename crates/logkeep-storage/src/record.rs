//! The persisted form of a log event

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A log event as it is stored
///
/// This is the flattened, owned representation the sink worker hands to a
/// [`StoreSession`](crate::StoreSession). Levels are stored by name so that
/// records stay readable even if the numeric level table changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Level name (e.g. "INFO")
    pub level: String,
    /// Name of the logger that produced the event
    pub logger_name: String,
    /// Rendered message
    pub message: String,
    /// Source file path
    pub pathname: String,
    /// Source line
    pub lineno: u32,
    /// Function or module path, when known
    pub function: Option<String>,
    /// Exception or error chain text
    pub exception: Option<String>,
    /// Event time in microseconds since the Unix epoch (UTC)
    pub timestamp_micros: i64,
    /// Producing process id
    pub process_id: u32,
    /// Producing thread id
    pub thread_id: u64,
}

impl LogRecord {
    /// Encode the record for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        postcard::to_allocvec(self).map_err(|e| StorageError::serialization(e.to_string()))
    }

    /// Decode a stored record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        postcard::from_bytes(bytes).map_err(|e| StorageError::deserialization(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) fn sample_record(message: &str) -> LogRecord {
    LogRecord {
        level: "INFO".to_string(),
        logger_name: "test".to_string(),
        message: message.to_string(),
        pathname: "src/main.rs".to_string(),
        lineno: 42,
        function: Some("main".to_string()),
        exception: None,
        timestamp_micros: 1_700_000_000_000_000,
        process_id: 1234,
        thread_id: 1,
    }
}
