//! Log ingestion and retention for logkeep
//!
//! This crate turns application log calls into formatted lines on any mix of
//! outputs, persists them through an asynchronous store-backed sink, and
//! compacts rotated log files into chunked `tar.gz` archives.
//!
//! # Features
//!
//! - **Outputs**: console, log file, syslog and injected sinks, each with its
//!   own level threshold and one shared format
//! - **Async Sink**: producers enqueue; one worker thread persists each event
//!   in its own store session, isolating callers from store latency and
//!   failures
//! - **Archival**: rotated `.log` files are moved in chunks of 100 into
//!   staging directories and written out as `tar.gz`, on init, on a timer,
//!   or on demand
//! - **tracing bridge**: [`LoggerLayer`] routes `tracing` events into a
//!   [`Logger`]
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use logkeep_logging::{LogConfig, LoggerBuilder};
//! use logkeep_storage::InMemoryLogStore;
//!
//! let logger = LoggerBuilder::from_config(LogConfig::development())
//!     .with_store(Arc::new(InMemoryLogStore::new()))
//!     .build()?;
//!
//! logger.info("service started");
//! logger.close();
//! ```
//!
//! # Archival
//!
//! ```ignore
//! use logkeep_logging::ChunkArchiver;
//!
//! let report = ChunkArchiver::new("svc", "./logs", "./logs/archive")
//!     .with_chunk_size(100)
//!     .run()?;
//! println!("{} files archived", report.archived_files());
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod format;
pub mod layers;
pub mod level;
pub mod logger;
pub mod outputs;
pub mod rotation;
pub mod sink;

pub use config::{
    ArchiveConfig, ArchiveTrigger, ConsoleConfig, FileConfig, LogConfig, StoreConfig,
    SyslogConfig,
};
pub use error::{ArchiveError, LogError, SubmitError};
pub use event::{LogEvent, SourceLocation};
pub use format::{DEFAULT_FORMAT, LogFormat};
pub use layers::LoggerLayer;
pub use level::{Level, LevelTable};
pub use logger::Logger;
pub use outputs::{ConsoleOutput, EventSink, FileOutput, FileTarget, Output, SyslogOutput};
pub use rotation::{
    ArchiveChunk, ArchiveReport, ArchiveWriter, ChunkArchiver, PeriodicArchiver, RotationScanner,
    TarGzWriter,
};
pub use sink::{AsyncSink, SinkStats};

use std::path::PathBuf;
use std::sync::Arc;

use logkeep_storage::{LogStore, RedbLogStore, RedbStoreConfig};
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Builder for configuring and creating a [`Logger`]
///
/// Every value is validated before anything touches the filesystem.
/// Archival under the on-init policy runs before outputs are attached, so
/// a fresh log file is never swept into an archive; a failed run is
/// reported and the logger is built anyway.
pub struct LoggerBuilder {
    config: LogConfig,
    sinks: Vec<(Arc<dyn EventSink>, Option<Level>)>,
    stores: Vec<(Arc<dyn LogStore>, Option<Level>)>,
    runtime: Option<Handle>,
}

impl LoggerBuilder {
    /// Builder with default configuration for the named logger
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(LogConfig {
            logger_name: name.into(),
            ..LogConfig::default()
        })
    }

    /// Builder starting from a full configuration
    pub fn from_config(config: LogConfig) -> Self {
        Self {
            config,
            sinks: Vec::new(),
            stores: Vec::new(),
            runtime: None,
        }
    }

    /// Set the logger level by name
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Set the message format template
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.config.format = format.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Choose the file output
    pub fn with_file(mut self, target: FileTarget) -> Self {
        match target {
            FileTarget::Disabled => self.config.file.enabled = false,
            FileTarget::Generated => {
                self.config.file.enabled = true;
                self.config.file.path = None;
            }
            FileTarget::Path(path) => {
                self.config.file.enabled = true;
                self.config.file.path = Some(path);
            }
        }
        self
    }

    /// Set the log and archive directories
    pub fn with_dirs(mut self, log_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = log_dir.into();
        self.config.archive_dir = archive_dir.into();
        self
    }

    /// Enable or disable syslog output
    pub fn with_syslog(mut self, enabled: bool) -> Self {
        self.config.syslog.enabled = enabled;
        self
    }

    /// Send syslog output to a specific socket
    pub fn with_syslog_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.syslog.enabled = true;
        self.config.syslog.socket_path = path.into();
        self
    }

    /// Add a custom output; `level` defaults to the logger level
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>, level: Option<Level>) -> Self {
        self.sinks.push((sink, level));
        self
    }

    /// Persist events to `store` through an [`AsyncSink`]
    pub fn with_store(self, store: Arc<dyn LogStore>) -> Self {
        self.with_store_at(store, None)
    }

    /// Persist events at or above `level` to `store`
    pub fn with_store_at(mut self, store: Arc<dyn LogStore>, level: Option<Level>) -> Self {
        self.stores.push((store, level));
        self
    }

    /// Replace the archival configuration
    pub fn with_archive(mut self, archive: ArchiveConfig) -> Self {
        self.config.archive = archive;
        self
    }

    /// Only archive on explicit request
    pub fn with_manual_archive(mut self) -> Self {
        self.config.archive.trigger = ArchiveTrigger::Manual;
        self
    }

    /// Runtime for periodic archival when `build` runs outside one
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate, run on-init archival and attach outputs
    pub fn build(self) -> Result<Logger, LogError> {
        let config = self.config;
        config.validate()?;

        let levels = LevelTable::new();
        let level = levels.parse(&config.level)?;
        let format = LogFormat::parse(&config.format)?;
        let output_level = |configured: Option<&str>| match configured {
            Some(name) => levels.parse(name),
            None => Ok(level),
        };

        let periodic_runtime = match config.archive.trigger {
            ArchiveTrigger::Periodic { .. } => Some(match self.runtime {
                Some(runtime) => runtime,
                None => Handle::try_current().map_err(|_| {
                    LogError::config("periodic archival requires a running tokio runtime")
                })?,
            }),
            _ => None,
        };

        let name = config.logger_name.clone();
        let archiver = Arc::new(
            ChunkArchiver::new(&name, &config.log_dir, &config.archive_dir)
                .with_chunk_size(config.archive.chunk_size)
                .with_flush_partial(config.archive.flush_partial),
        );

        if config.archive.trigger == ArchiveTrigger::OnInit {
            if let Some(report) = rotation::run_on_init(&archiver) {
                if !report.chunks.is_empty() {
                    info!(
                        logger = %name,
                        chunks = report.chunks.len(),
                        files = report.archived_files(),
                        "Archived old log files"
                    );
                }
            }
        }

        let mut outputs = Vec::new();

        if config.console.enabled {
            let threshold = output_level(config.console.level.as_deref())?;
            outputs.push(Output::new(Arc::new(ConsoleOutput), threshold));
        }

        let file = if config.file.enabled {
            let file = Arc::new(match &config.file.path {
                Some(path) => FileOutput::at_path(path, &name)?,
                None => FileOutput::generated(&config.log_dir, &name)?,
            });
            let threshold = output_level(config.file.level.as_deref())?;
            outputs.push(Output::new(file.clone(), threshold));
            Some(file)
        } else {
            None
        };

        if config.syslog.enabled {
            let threshold = output_level(config.syslog.level.as_deref())?;
            match SyslogOutput::connect(&config.syslog.socket_path) {
                Ok(Some(syslog)) => outputs.push(Output::new(Arc::new(syslog), threshold)),
                Ok(None) => {}
                Err(e) => warn!(
                    socket = %config.syslog.socket_path.display(),
                    error = %e,
                    "Could not connect to syslog; continuing without it"
                ),
            }
        }

        for (sink, threshold) in self.sinks {
            outputs.push(Output::new(sink, threshold.unwrap_or(level)));
        }

        let mut stores = self.stores;
        if let Some(store_config) = &config.store {
            let store: Arc<dyn LogStore> = Arc::new(RedbLogStore::open(RedbStoreConfig {
                db_path: store_config.db_path.clone(),
            })?);
            let threshold = output_level(store_config.level.as_deref())?;
            stores.push((store, Some(threshold)));
        }

        let mut sinks = Vec::with_capacity(stores.len());
        for (index, (store, threshold)) in stores.into_iter().enumerate() {
            let sink = Arc::new(AsyncSink::spawn_named(format!("{name}-sink-{index}"), store)?);
            outputs.push(Output::new(sink.clone(), threshold.unwrap_or(level)));
            sinks.push(sink);
        }

        let periodic = match (periodic_runtime, config.archive.trigger.interval()) {
            (Some(runtime), Some(interval)) => Some(PeriodicArchiver::spawn_on(
                &runtime,
                Arc::clone(&archiver),
                interval,
                file.clone(),
            )?),
            _ => None,
        };

        info!(logger = %name, level = %level, outputs = outputs.len(), "Logger ready");

        Ok(Logger::new(
            name, level, format, outputs, file, sinks, archiver, periodic,
        ))
    }
}

/// Logger with default configuration and `LOG_LEVEL` applied
pub fn init_default(name: impl Into<String>) -> Result<Logger, LogError> {
    let config = LogConfig {
        logger_name: name.into(),
        ..LogConfig::default()
    };
    LoggerBuilder::from_config(config.with_env_overrides()).build()
}

/// Quiet console-only logger for tests
pub fn init_testing(name: impl Into<String>) -> Result<Logger, LogError> {
    let config = LogConfig {
        logger_name: name.into(),
        ..LogConfig::testing()
    };
    LoggerBuilder::from_config(config).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use logkeep_storage::InMemoryLogStore;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Capture {
        lines: Mutex<Vec<String>>,
    }

    impl EventSink for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        fn emit(&self, _event: &LogEvent, formatted: &str) -> Result<(), LogError> {
            self.lines.lock().push(formatted.to_string());
            Ok(())
        }
    }

    struct Broken;

    impl EventSink for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn emit(&self, _event: &LogEvent, _formatted: &str) -> Result<(), LogError> {
            Err(LogError::Io("disk full".to_string()))
        }
    }

    fn quiet(name: &str) -> LoggerBuilder {
        LoggerBuilder::new(name)
            .with_console(false)
            .with_file(FileTarget::Disabled)
            .with_manual_archive()
    }

    #[test]
    fn test_levels_filter_events() {
        let capture = Arc::new(Capture::default());
        let logger = quiet("svc")
            .with_level("warning")
            .with_format("{levelname}:{message}")
            .with_sink(capture.clone(), None)
            .build()
            .unwrap();

        logger.debug("hidden");
        logger.info("hidden");
        logger.warning("shown");
        logger.critical("shown too");

        assert_eq!(
            *capture.lines.lock(),
            vec!["WARNING:shown".to_string(), "CRITICAL:shown too".to_string()]
        );
        assert!(!logger.is_enabled_for(Level::Info));
    }

    #[test]
    fn test_per_output_levels() {
        let all = Arc::new(Capture::default());
        let errors = Arc::new(Capture::default());
        let logger = quiet("svc")
            .with_level("trace")
            .with_format("{message}")
            .with_sink(all.clone(), None)
            .with_sink(errors.clone(), Some(Level::Error))
            .build()
            .unwrap();

        logger.trace("t");
        logger.error("e");

        assert_eq!(all.lines.lock().len(), 2);
        assert_eq!(*errors.lines.lock(), vec!["e".to_string()]);
    }

    #[test]
    fn test_source_location_is_caller() {
        let capture = Arc::new(Capture::default());
        let logger = quiet("svc")
            .with_format("{filename}:{lineno}")
            .with_sink(capture.clone(), None)
            .build()
            .unwrap();

        let line = line!() + 1;
        logger.info("where");

        assert_eq!(capture.lines.lock()[0], format!("lib.rs:{line}"));
    }

    #[test]
    fn test_failing_output_does_not_reach_caller() {
        let capture = Arc::new(Capture::default());
        let logger = quiet("svc")
            .with_format("{message}")
            .with_sink(Arc::new(Broken), None)
            .with_sink(capture.clone(), None)
            .build()
            .unwrap();

        logger.error("still delivered");
        assert_eq!(*capture.lines.lock(), vec!["still delivered".to_string()]);
    }

    #[test]
    fn test_exception_carries_error_chain() {
        let capture = Arc::new(Capture::default());
        let logger = quiet("svc")
            .with_format("{levelname} {message}")
            .with_sink(capture.clone(), None)
            .build()
            .unwrap();

        let err = std::io::Error::other("socket closed");
        logger.exception("request failed", &err);

        assert_eq!(
            capture.lines.lock()[0],
            "ERROR request failed\nsocket closed"
        );
    }

    #[test]
    fn test_store_receives_events_on_close() {
        let store = Arc::new(InMemoryLogStore::new());
        let logger = quiet("svc").with_store(store.clone()).build().unwrap();

        logger.info("one");
        logger.warning("two");
        logger.close();

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].level, "WARNING");
        assert_eq!(records[1].logger_name, "svc");
        assert_eq!(logger.sink_stats()[0].persisted, 2);

        logger.info("after close");
        assert_eq!(store.records().len(), 2);
    }

    #[test]
    fn test_invalid_config_has_no_side_effects() {
        let temp = TempDir::new().unwrap();
        let log_dir = temp.path().join("logs");
        let result = LoggerBuilder::new("svc")
            .with_dirs(&log_dir, temp.path().join("archive"))
            .with_level("shouting")
            .build();

        assert!(matches!(result, Err(LogError::Config(_))));
        assert!(!log_dir.exists());
    }

    #[test]
    fn test_periodic_requires_runtime() {
        let result = quiet("svc")
            .with_archive(ArchiveConfig {
                trigger: ArchiveTrigger::Periodic { interval_secs: 60 },
                ..ArchiveConfig::default()
            })
            .build();
        assert!(matches!(result, Err(LogError::Config(_))));
    }

    #[test]
    fn test_file_output_and_manual_archive() {
        let temp = TempDir::new().unwrap();
        let log_dir = temp.path().join("logs");
        let archive_dir = temp.path().join("archive");

        let logger = LoggerBuilder::new("svc")
            .with_console(false)
            .with_dirs(&log_dir, &archive_dir)
            .with_manual_archive()
            .with_archive(ArchiveConfig {
                chunk_size: 2,
                trigger: ArchiveTrigger::Manual,
                ..ArchiveConfig::default()
            })
            .build()
            .unwrap();

        logger.info("first file");
        let first = logger.active_file().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let closed = logger.rotate_file().unwrap().unwrap();
        assert_eq!(closed, first);
        fs::write(log_dir.join("svc_1.log"), b"older").unwrap();

        let report = logger.archive_now().unwrap();
        assert_eq!(report.archived_files(), 2);
        assert!(logger.active_file().unwrap().exists());
        assert!(!first.exists());
    }

    #[test]
    fn test_on_init_archives_before_new_file() {
        let temp = TempDir::new().unwrap();
        let log_dir = temp.path().join("logs");
        let archive_dir = temp.path().join("archive");
        fs::create_dir_all(&log_dir).unwrap();
        for i in 0..3 {
            fs::write(log_dir.join(format!("svc_{i}.log")), b"old").unwrap();
        }

        let logger = LoggerBuilder::new("svc")
            .with_console(false)
            .with_dirs(&log_dir, &archive_dir)
            .with_archive(ArchiveConfig {
                chunk_size: 3,
                ..ArchiveConfig::default()
            })
            .build()
            .unwrap();

        assert_eq!(fs::read_dir(&archive_dir).unwrap().count(), 1);
        let remaining: Vec<_> = RotationScanner::scan(&log_dir).collect();
        assert_eq!(remaining, vec![logger.active_file().unwrap()]);
    }

    #[test]
    fn test_init_testing() {
        let logger = init_testing("unit").unwrap();
        assert_eq!(logger.name(), "unit");
        assert_eq!(logger.level(), Level::Warning);
        assert!(logger.active_file().is_none());
    }
}
