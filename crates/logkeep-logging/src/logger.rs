//! The logger handle
//!
//! A [`Logger`] is an owned value built by
//! [`LoggerBuilder`](crate::LoggerBuilder). It renders each event once with
//! its format and fans it out to every output whose threshold admits the
//! event's level. Output failures are reported as diagnostics and never
//! reach the caller.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::LogError;
use crate::event::{LogEvent, SourceLocation};
use crate::format::LogFormat;
use crate::level::Level;
use crate::outputs::{FileOutput, Output};
use crate::rotation::{ArchiveReport, ChunkArchiver, PeriodicArchiver, archive_inactive};
use crate::sink::{AsyncSink, SinkStats};

/// Render an error and its sources, one per line
pub(crate) fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str("\nCaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// A configured logger
pub struct Logger {
    name: String,
    level: Level,
    format: LogFormat,
    outputs: Vec<Output>,
    file: Option<Arc<FileOutput>>,
    sinks: Vec<Arc<AsyncSink>>,
    archiver: Arc<ChunkArchiver>,
    periodic: Mutex<Option<PeriodicArchiver>>,
    closed: AtomicBool,
}

impl Logger {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        level: Level,
        format: LogFormat,
        outputs: Vec<Output>,
        file: Option<Arc<FileOutput>>,
        sinks: Vec<Arc<AsyncSink>>,
        archiver: Arc<ChunkArchiver>,
        periodic: Option<PeriodicArchiver>,
    ) -> Self {
        Self {
            name,
            level,
            format,
            outputs,
            file,
            sinks,
            archiver,
            periodic: Mutex::new(periodic),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn format(&self) -> &LogFormat {
        &self.format
    }

    /// Whether an event at `level` would be emitted
    pub fn is_enabled_for(&self, level: Level) -> bool {
        !self.is_closed() && level >= self.level
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[track_caller]
    pub fn trace(&self, message: impl Into<String>) {
        self.log_at(Level::Trace, message.into(), SourceLocation::caller());
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.log_at(Level::Debug, message.into(), SourceLocation::caller());
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.log_at(Level::Info, message.into(), SourceLocation::caller());
    }

    #[track_caller]
    pub fn warning(&self, message: impl Into<String>) {
        self.log_at(Level::Warning, message.into(), SourceLocation::caller());
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.log_at(Level::Error, message.into(), SourceLocation::caller());
    }

    #[track_caller]
    pub fn critical(&self, message: impl Into<String>) {
        self.log_at(Level::Critical, message.into(), SourceLocation::caller());
    }

    /// Log at an explicit level
    #[track_caller]
    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.log_at(level, message.into(), SourceLocation::caller());
    }

    /// Log at ERROR with the error and its sources as exception text
    #[track_caller]
    pub fn exception(&self, message: impl Into<String>, err: &(dyn Error + 'static)) {
        if !self.is_enabled_for(Level::Error) {
            return;
        }
        let event = LogEvent::new(Level::Error, &self.name, message, SourceLocation::caller())
            .with_exception(error_chain(err));
        self.dispatch(&event);
    }

    /// Emit a prepared event
    pub fn log_event(&self, event: LogEvent) {
        if self.is_enabled_for(event.level()) {
            self.dispatch(&event);
        }
    }

    fn log_at(&self, level: Level, message: String, location: SourceLocation) {
        if self.is_enabled_for(level) {
            self.dispatch(&LogEvent::new(level, &self.name, message, location));
        }
    }

    fn dispatch(&self, event: &LogEvent) {
        let formatted = self.format.render(event);
        for output in self.outputs.iter().filter(|o| o.accepts(event.level())) {
            if let Err(e) = output.sink().emit(event, &formatted) {
                warn!(
                    logger = %self.name,
                    output = output.sink().name(),
                    error = %e,
                    "Log output failed"
                );
            }
        }
    }

    /// Flush every output
    pub fn flush(&self) {
        for output in &self.outputs {
            if let Err(e) = output.sink().flush() {
                warn!(output = output.sink().name(), error = %e, "Failed to flush log output");
            }
        }
    }

    /// Run archival now, leaving the active log file in place
    pub fn archive_now(&self) -> Result<ArchiveReport, LogError> {
        let active = self.file.as_ref().map(|file| file.path());
        Ok(archive_inactive(&self.archiver, active.as_deref())?)
    }

    /// Start a new log file, returning the path of the closed one
    ///
    /// Returns `None` when the logger has no file output.
    pub fn rotate_file(&self) -> Result<Option<PathBuf>, LogError> {
        self.file.as_ref().map(|file| file.rotate()).transpose()
    }

    /// The file currently written to, if any
    pub fn active_file(&self) -> Option<PathBuf> {
        self.file.as_ref().map(|file| file.path())
    }

    pub fn archiver(&self) -> &ChunkArchiver {
        &self.archiver
    }

    /// Activity of each store-backed sink
    pub fn sink_stats(&self) -> Vec<SinkStats> {
        self.sinks.iter().map(|sink| sink.stats()).collect()
    }

    /// Stop archival and close every output
    ///
    /// Blocks until store-backed sinks have handled every queued event.
    /// Idempotent; events logged afterwards are dropped.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(periodic) = self.periodic.lock().take() {
            periodic.stop_and_wait();
        }
        self.flush();
        for output in &self.outputs {
            output.sink().close();
        }
        debug!(logger = %self.name, "Logger closed");
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("outputs", &self.outputs.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
