//! Log events
//!
//! A [`LogEvent`] is created by a producer call and never changes afterwards.
//! Its fields are private; the only way to shape an event is at
//! construction.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use logkeep_storage::LogRecord;

use crate::level::Level;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Small, stable id for the calling thread, assigned on first use
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// Where in the source an event was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    /// Function or module path, when the producer knows it
    pub function: Option<String>,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, function: Option<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function,
        }
    }

    /// Location of the caller of the enclosing `#[track_caller]` function
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self::new(location.file(), location.line(), None)
    }

    /// Base name of the source file
    pub fn filename(&self) -> &str {
        Path::new(&self.file)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.file)
    }
}

/// A single log event
#[derive(Debug, Clone)]
pub struct LogEvent {
    timestamp: DateTime<Utc>,
    level: Level,
    logger_name: String,
    message: String,
    location: SourceLocation,
    exception: Option<String>,
    process_id: u32,
    thread_id: u64,
    thread_name: Option<String>,
}

impl LogEvent {
    /// Create an event stamped with the current time, process and thread
    pub fn new(
        level: Level,
        logger_name: impl Into<String>,
        message: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            location,
            exception: None,
            process_id: std::process::id(),
            thread_id: current_thread_id(),
            thread_name: std::thread::current().name().map(str::to_string),
        }
    }

    /// Attach exception text
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }
}

impl From<&LogEvent> for LogRecord {
    fn from(event: &LogEvent) -> Self {
        LogRecord {
            level: event.level.as_str().to_string(),
            logger_name: event.logger_name.clone(),
            message: event.message.clone(),
            pathname: event.location.file.clone(),
            lineno: event.location.line,
            function: event.location.function.clone(),
            exception: event.exception.clone(),
            timestamp_micros: event.timestamp.timestamp_micros(),
            process_id: event.process_id,
            thread_id: event.thread_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_location() {
        let location = SourceLocation::caller();
        assert!(location.file.ends_with("event.rs"));
        assert_eq!(location.filename(), "event.rs");
        assert!(location.line > 0);
    }

    #[test]
    fn test_event_to_record() {
        let event = LogEvent::new(
            Level::Error,
            "svc",
            "write failed",
            SourceLocation::new("src/db/writer.rs", 17, Some("flush".to_string())),
        )
        .with_exception("disk full");

        let record = LogRecord::from(&event);
        assert_eq!(record.level, "ERROR");
        assert_eq!(record.logger_name, "svc");
        assert_eq!(record.pathname, "src/db/writer.rs");
        assert_eq!(record.lineno, 17);
        assert_eq!(record.function.as_deref(), Some("flush"));
        assert_eq!(record.exception.as_deref(), Some("disk full"));
        assert_eq!(record.process_id, std::process::id());
        assert_eq!(record.timestamp_micros, event.timestamp().timestamp_micros());
    }

    #[test]
    fn test_thread_ids_differ_between_threads() {
        let here = current_thread_id();
        assert_eq!(here, current_thread_id());

        let there = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
    }
}
