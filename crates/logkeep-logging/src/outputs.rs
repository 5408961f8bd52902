//! Log outputs
//!
//! Every destination a logger writes to implements [`EventSink`]: the
//! console, a log file, the platform syslog socket, the store-backed
//! [`AsyncSink`](crate::sink::AsyncSink), and anything injected by the
//! application. Each output has its own level threshold.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::LogError;
use crate::event::LogEvent;
use crate::level::Level;
use crate::rotation::{active_log_path, create_log_dir};

/// Default syslog socket
pub const DEFAULT_SYSLOG_PATH: &str = "/dev/log";

/// A destination for formatted log events
pub trait EventSink: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Write one event; `formatted` is the event rendered by the logger's format
    fn emit(&self, event: &LogEvent, formatted: &str) -> Result<(), LogError>;

    /// Push buffered output to its destination
    fn flush(&self) -> Result<(), LogError> {
        Ok(())
    }

    /// Release the destination; later emits may fail
    fn close(&self) {}
}

/// An output together with its level threshold
#[derive(Clone)]
pub struct Output {
    level: Level,
    sink: Arc<dyn EventSink>,
}

impl Output {
    pub fn new(sink: Arc<dyn EventSink>, level: Level) -> Self {
        Self { level, sink }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Whether events at `level` reach this output
    pub fn accepts(&self, level: Level) -> bool {
        level >= self.level
    }
}

/// Writes to standard error
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

impl EventSink for ConsoleOutput {
    fn name(&self) -> &str {
        "console"
    }

    fn emit(&self, _event: &LogEvent, formatted: &str) -> Result<(), LogError> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{formatted}")?;
        Ok(())
    }

    fn flush(&self) -> Result<(), LogError> {
        io::stderr().flush()?;
        Ok(())
    }
}

/// Where file output goes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileTarget {
    /// No file output
    Disabled,
    /// A fresh `{logger_name}_{epoch_micros}.log` in the log directory
    #[default]
    Generated,
    /// An explicit file
    Path(PathBuf),
}

/// Appends lines to a log file
///
/// The file can be swapped for a fresh one with [`rotate`](Self::rotate),
/// which is how a long-running process makes its output eligible for
/// archival.
pub struct FileOutput {
    log_dir: PathBuf,
    logger_name: String,
    state: Mutex<FileState>,
}

struct FileState {
    path: PathBuf,
    writer: Option<LineWriter<File>>,
}

impl FileOutput {
    /// Open a freshly named file in `log_dir`, creating the directory
    pub fn generated(log_dir: impl AsRef<Path>, logger_name: &str) -> Result<Self, LogError> {
        let log_dir = log_dir.as_ref();
        create_log_dir(log_dir)?;
        Self::open_at(log_dir.to_path_buf(), logger_name, active_log_path(log_dir, logger_name))
    }

    /// Open (or append to) an explicit file
    ///
    /// Rotation of such a file continues with generated names in the same
    /// directory.
    pub fn at_path(path: impl Into<PathBuf>, logger_name: &str) -> Result<Self, LogError> {
        let path = path.into();
        let log_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        create_log_dir(&log_dir)?;
        Self::open_at(log_dir, logger_name, path)
    }

    fn open_at(log_dir: PathBuf, logger_name: &str, path: PathBuf) -> Result<Self, LogError> {
        let writer = open_append(&path)?;
        debug!(path = %path.display(), "Opened log file");
        Ok(Self {
            log_dir,
            logger_name: logger_name.to_string(),
            state: Mutex::new(FileState {
                path,
                writer: Some(writer),
            }),
        })
    }

    /// The file currently written to
    pub fn path(&self) -> PathBuf {
        self.state.lock().path.clone()
    }

    /// Switch to a new file, returning the path of the one just closed
    ///
    /// Fails without creating anything once the output has been closed.
    pub fn rotate(&self) -> Result<PathBuf, LogError> {
        let mut state = self.state.lock();
        let Some(previous) = state.writer.as_mut() else {
            return Err(LogError::Io("log file is closed".to_string()));
        };
        previous.flush()?;

        let next = active_log_path(&self.log_dir, &self.logger_name);
        state.writer = Some(open_append(&next)?);
        Ok(std::mem::replace(&mut state.path, next))
    }
}

fn open_append(path: &Path) -> io::Result<LineWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(LineWriter::new(file))
}

impl EventSink for FileOutput {
    fn name(&self) -> &str {
        "file"
    }

    fn emit(&self, _event: &LogEvent, formatted: &str) -> Result<(), LogError> {
        let mut state = self.state.lock();
        match state.writer.as_mut() {
            Some(writer) => {
                writeln!(writer, "{formatted}")?;
                Ok(())
            }
            None => Err(LogError::Io("log file is closed".to_string())),
        }
    }

    fn flush(&self) -> Result<(), LogError> {
        if let Some(writer) = self.state.lock().writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&self) {
        if let Some(mut writer) = self.state.lock().writer.take() {
            let _ = writer.flush();
        }
    }
}

/// syslog severity for a level (RFC 5424 numbering)
pub fn syslog_severity(level: Level) -> u8 {
    match level {
        Level::Critical => 2,
        Level::Error => 3,
        Level::Warning => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

/// syslog priority for a level under the USER facility
pub fn syslog_priority(level: Level) -> u8 {
    const FACILITY_USER: u8 = 1;
    FACILITY_USER * 8 + syslog_severity(level)
}

/// Sends events to the local syslog daemon over its datagram socket
#[cfg(unix)]
pub struct SyslogOutput {
    socket: std::os::unix::net::UnixDatagram,
    path: PathBuf,
}

#[cfg(unix)]
impl SyslogOutput {
    /// Connect to the socket at `path`
    ///
    /// Returns `None` when the socket does not exist, so hosts without a
    /// syslog daemon simply run without this output.
    pub fn connect(path: impl AsRef<Path>) -> Result<Option<Self>, LogError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No syslog socket; syslog output disabled");
            return Ok(None);
        }
        let socket = std::os::unix::net::UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(Some(Self {
            socket,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
impl EventSink for SyslogOutput {
    fn name(&self) -> &str {
        "syslog"
    }

    fn emit(&self, event: &LogEvent, formatted: &str) -> Result<(), LogError> {
        let message = format!("<{}>{}\0", syslog_priority(event.level()), formatted);
        self.socket.send(message.as_bytes())?;
        Ok(())
    }
}

/// syslog is unavailable without unix sockets; no value of this type exists
#[cfg(not(unix))]
pub enum SyslogOutput {}

#[cfg(not(unix))]
impl SyslogOutput {
    /// Always `None`: the output is skipped on this platform
    pub fn connect(_path: impl AsRef<Path>) -> Result<Option<Self>, LogError> {
        debug!("syslog output is not supported on this platform");
        Ok(None)
    }
}

#[cfg(not(unix))]
impl EventSink for SyslogOutput {
    fn name(&self) -> &str {
        match *self {}
    }

    fn emit(&self, _event: &LogEvent, _formatted: &str) -> Result<(), LogError> {
        match *self {}
    }
}
