//! Log levels and the level table
//!
//! Levels are a fixed, ordered set. The [`LevelTable`] resolves configured
//! level names; it is built once, before a logger exists, and never changes
//! afterwards. TRACE sits below DEBUG and is added to the table by
//! [`LevelTable::register_trace`], which may be called any number of times.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Name under which the low-verbosity level is registered
pub const TRACE_LEVEL_NAME: &str = "TRACE";

/// Severity of a log event, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Level {
    Trace = 5,
    Debug = 10,
    Info = 20,
    Warning = 30,
    Error = 40,
    Critical = 50,
}

impl Level {
    /// All levels, least severe first
    pub const ALL: [Level; 6] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    /// Numeric value of the level
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Canonical upper-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => TRACE_LEVEL_NAME,
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// Look a level up by its numeric value
    pub fn from_value(value: u8) -> Option<Level> {
        Level::ALL.into_iter().find(|level| level.value() == value)
    }

    /// The closest `tracing` level; CRITICAL has no counterpart and maps to ERROR
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            Level::Trace => tracing::Level::TRACE,
            Level::Debug => tracing::Level::DEBUG,
            Level::Info => tracing::Level::INFO,
            Level::Warning => tracing::Level::WARN,
            Level::Error | Level::Critical => tracing::Level::ERROR,
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            _ => Level::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LevelTable::new().parse(s)
    }
}

/// Mapping from configured level names to levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    by_name: BTreeMap<String, Level>,
}

impl LevelTable {
    /// Table with DEBUG through CRITICAL, without TRACE
    pub fn standard() -> Self {
        let by_name = Level::ALL
            .into_iter()
            .filter(|level| *level != Level::Trace)
            .map(|level| (level.as_str().to_string(), level))
            .collect();
        Self { by_name }
    }

    /// Standard table with TRACE registered
    pub fn new() -> Self {
        let mut table = Self::standard();
        table.register_trace();
        table
    }

    /// Register TRACE, returning its numeric value
    ///
    /// Registering again leaves the table unchanged and returns the value
    /// recorded the first time.
    pub fn register_trace(&mut self) -> u8 {
        self.by_name
            .entry(TRACE_LEVEL_NAME.to_string())
            .or_insert(Level::Trace)
            .value()
    }

    /// Numeric value registered under `name`
    pub fn value_of(&self, name: &str) -> Option<u8> {
        self.by_name
            .get(&name.trim().to_ascii_uppercase())
            .map(|level| level.value())
    }

    /// Whether `name` resolves to a level
    pub fn contains(&self, name: &str) -> bool {
        self.value_of(name).is_some()
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Registered names, alphabetically
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Resolve a configured level
    ///
    /// Names are case-insensitive and surrounding whitespace is ignored.
    /// `WARN` is accepted for WARNING, and a numeric string resolves when it
    /// is the value of a registered level.
    pub fn parse(&self, name: &str) -> Result<Level, LogError> {
        let normalized = name.trim().to_ascii_uppercase();
        let key = if normalized == "WARN" {
            "WARNING"
        } else {
            normalized.as_str()
        };

        if let Some(level) = self.by_name.get(key) {
            return Ok(*level);
        }

        if let Ok(value) = key.parse::<u8>() {
            if let Some(level) = Level::from_value(value) {
                if self.by_name.contains_key(level.as_str()) {
                    return Ok(level);
                }
            }
        }

        Err(LogError::config(format!("unknown log level '{}'", name.trim())))
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self::new()
    }
}
