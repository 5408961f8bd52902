//! Error types for logkeep-logging

use std::path::{Path, PathBuf};

use logkeep_storage::StorageError;
use thiserror::Error;

use crate::event::LogEvent;

/// Errors raised while setting up or driving a logger
#[derive(Debug, Error)]
pub enum LogError {
    /// Missing or invalid setup values, reported before any side effect
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error from an output
    #[error("I/O error: {0}")]
    Io(String),

    /// Store could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Archival run failed
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// The async sink rejected or could not start
    #[error("Sink error: {0}")]
    Sink(String),
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        LogError::Io(err.to_string())
    }
}

impl LogError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Errors raised by an archival run
///
/// Each error aborts the chunk being flushed. Files already moved stay in the
/// staging directory named by the error.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// A scanned file could not be moved into staging
    #[error("failed to move {} into {}: {message}", path.display(), staging.display())]
    Move {
        path: PathBuf,
        staging: PathBuf,
        message: String,
    },

    /// The staging directory could not be compressed; it is left in place
    #[error("failed to compress {}: {message}", staging.display())]
    Compress { staging: PathBuf, message: String },

    /// Directory creation or other filesystem failure
    #[error("I/O error on {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// A chunk must hold at least one file
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

impl ArchiveError {
    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Why [`AsyncSink::submit`](crate::sink::AsyncSink::submit) refused an event
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The sink was closed; the event is handed back
    #[error("sink is closed")]
    Closed(Box<LogEvent>),

    /// The worker is no longer receiving
    #[error("sink worker is gone")]
    Disconnected,
}
