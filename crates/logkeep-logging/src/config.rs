//! Configuration types for a logger

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LogError;
use crate::format::{DEFAULT_FORMAT, LogFormat};
use crate::level::{Level, LevelTable};
use crate::outputs::DEFAULT_SYSLOG_PATH;
use crate::rotation::DEFAULT_CHUNK_SIZE;

/// Environment variable overriding the configured level
pub const LEVEL_ENV_VAR: &str = "LOG_LEVEL";

/// Main logger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Logger name, used in file and archive names
    pub logger_name: String,

    /// Minimum level for the logger (case-insensitive name)
    pub level: String,

    /// Message format shared by every output
    pub format: String,

    /// Directory holding active and rotated log files
    pub log_dir: PathBuf,

    /// Directory receiving `.tar.gz` archives
    pub archive_dir: PathBuf,

    pub console: ConsoleConfig,
    pub file: FileConfig,
    pub syslog: SyslogConfig,

    /// Durable store behind the async sink, if any
    pub store: Option<StoreConfig>,

    pub archive: ArchiveConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            logger_name: "logkeep".to_string(),
            level: "info".to_string(),
            format: DEFAULT_FORMAT.to_string(),
            log_dir: PathBuf::from("./logs"),
            archive_dir: PathBuf::from("./logs/archive"),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
            syslog: SyslogConfig::default(),
            store: None,
            archive: ArchiveConfig::default(),
        }
    }
}

impl LogConfig {
    /// Verbose console output, no files
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleConfig {
                enabled: true,
                level: Some("debug".to_string()),
            },
            file: FileConfig {
                enabled: false,
                ..FileConfig::default()
            },
            archive: ArchiveConfig {
                trigger: ArchiveTrigger::Manual,
                ..ArchiveConfig::default()
            },
            ..Default::default()
        }
    }

    /// File, syslog and a durable store under `log_dir`; console off
    pub fn production(log_dir: PathBuf) -> Self {
        let archive_dir = log_dir.join("archive");
        let db_path = log_dir.join("logkeep.redb");
        Self {
            level: "info".to_string(),
            log_dir,
            archive_dir,
            console: ConsoleConfig {
                enabled: false,
                level: None,
            },
            file: FileConfig::default(),
            syslog: SyslogConfig {
                enabled: true,
                ..SyslogConfig::default()
            },
            store: Some(StoreConfig {
                db_path,
                level: None,
            }),
            archive: ArchiveConfig::default(),
            ..Default::default()
        }
    }

    /// Warnings only, no files and no archival
    pub fn testing() -> Self {
        Self {
            level: "warning".to_string(),
            console: ConsoleConfig {
                enabled: true,
                level: Some("warning".to_string()),
            },
            file: FileConfig {
                enabled: false,
                ..FileConfig::default()
            },
            archive: ArchiveConfig {
                trigger: ArchiveTrigger::Manual,
                ..ArchiveConfig::default()
            },
            ..Default::default()
        }
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, LogError> {
        toml::from_str(source).map_err(|e| LogError::config(format!("invalid TOML: {e}")))
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| LogError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Apply `LOG_LEVEL` when it is set and not empty
    pub fn with_env_overrides(self) -> Self {
        let value = std::env::var(LEVEL_ENV_VAR).ok();
        self.with_level_override(value.as_deref())
    }

    fn with_level_override(mut self, value: Option<&str>) -> Self {
        if let Some(level) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.level = level.to_string();
        }
        self
    }

    /// Check every value that could fail later, before anything is created
    pub fn validate(&self) -> Result<(), LogError> {
        if self.logger_name.trim().is_empty() {
            return Err(LogError::config("logger name must not be empty"));
        }
        if self.logger_name.contains(['/', '\\']) {
            return Err(LogError::config(format!(
                "logger name {:?} must not contain path separators",
                self.logger_name
            )));
        }

        let levels = LevelTable::new();
        levels.parse(&self.level)?;
        for level in [
            self.console.level.as_deref(),
            self.file.level.as_deref(),
            self.syslog.level.as_deref(),
            self.store.as_ref().and_then(|s| s.level.as_deref()),
        ]
        .into_iter()
        .flatten()
        {
            levels.parse(level)?;
        }

        LogFormat::parse(&self.format)?;

        if self.archive.chunk_size == 0 {
            return Err(LogError::config("archive chunk size must be greater than zero"));
        }
        if let ArchiveTrigger::Periodic { interval_secs: 0 } = self.archive.trigger {
            return Err(LogError::config("archive interval must be greater than zero"));
        }
        Ok(())
    }

    /// The logger level, parsed
    pub fn parsed_level(&self) -> Result<Level, LogError> {
        LevelTable::new().parse(&self.level)
    }
}

/// Console output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Level for console output; the logger level when unset
    pub level: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: None,
        }
    }
}

/// File output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    /// Explicit file; a generated name under `log_dir` when unset
    pub path: Option<PathBuf>,
    pub level: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            level: None,
        }
    }
}

/// syslog output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogConfig {
    pub enabled: bool,
    pub socket_path: PathBuf,
    pub level: Option<String>,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            socket_path: PathBuf::from(DEFAULT_SYSLOG_PATH),
            level: None,
        }
    }
}

/// Durable store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// redb database file
    pub db_path: PathBuf,
    #[serde(default)]
    pub level: Option<String>,
}

/// Archival configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Files per archive
    pub chunk_size: usize,
    /// Archive a trailing chunk smaller than `chunk_size`
    pub flush_partial: bool,
    pub trigger: ArchiveTrigger,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            flush_partial: false,
            trigger: ArchiveTrigger::default(),
        }
    }
}

/// When archival runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ArchiveTrigger {
    /// Once, while the logger is built
    #[default]
    OnInit,
    /// On a timer; needs a running tokio runtime
    Periodic { interval_secs: u64 },
    /// Only when asked
    Manual,
}

impl ArchiveTrigger {
    /// The timer period for the periodic policy
    pub fn interval(&self) -> Option<Duration> {
        match self {
            ArchiveTrigger::Periodic { interval_secs } => Some(Duration::from_secs(*interval_secs)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.logger_name, "logkeep");
        assert_eq!(config.parsed_level().unwrap(), Level::Info);
        assert_eq!(config.archive.chunk_size, 100);
        assert!(!config.archive.flush_partial);
        assert_eq!(config.archive.trigger, ArchiveTrigger::OnInit);
        assert_eq!(config.syslog.socket_path, PathBuf::from("/dev/log"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        assert!(LogConfig::development().validate().is_ok());
        assert!(LogConfig::testing().validate().is_ok());

        let production = LogConfig::production(PathBuf::from("/var/log/svc"));
        assert!(production.validate().is_ok());
        assert_eq!(production.archive_dir, PathBuf::from("/var/log/svc/archive"));
        assert!(production.store.is_some());
        assert!(!production.console.enabled);
    }

    #[test]
    fn test_from_toml() {
        let config = LogConfig::from_toml_str(
            r#"
            logger_name = "billing"
            level = "TRACE"
            log_dir = "/tmp/billing"

            [console]
            enabled = false

            [store]
            db_path = "/tmp/billing/records.redb"
            level = "error"

            [archive]
            chunk_size = 10
            trigger = { policy = "periodic", interval_secs = 60 }
            "#,
        )
        .unwrap();

        assert_eq!(config.logger_name, "billing");
        assert_eq!(config.parsed_level().unwrap(), Level::Trace);
        assert!(!config.console.enabled);
        assert!(config.file.enabled);
        assert_eq!(config.archive.chunk_size, 10);
        assert_eq!(config.archive.trigger.interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.store.unwrap().level.as_deref(), Some("error"));
    }

    #[test]
    fn test_manual_trigger_from_toml() {
        let config = LogConfig::from_toml_str("[archive]\ntrigger = { policy = \"manual\" }\n")
            .unwrap();
        assert_eq!(config.archive.trigger, ArchiveTrigger::Manual);
        assert_eq!(config.archive.trigger.interval(), None);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            LogConfig::from_toml_str("level = ["),
            Err(LogError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = LogConfig::default();
        config.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = LogConfig::default();
        config.logger_name = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = LogConfig::default();
        config.logger_name = "a/b".to_string();
        assert!(config.validate().is_err());

        let mut config = LogConfig::default();
        config.archive.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = LogConfig::default();
        config.archive.trigger = ArchiveTrigger::Periodic { interval_secs: 0 };
        assert!(config.validate().is_err());

        let mut config = LogConfig::default();
        config.format = "{nonsense}".to_string();
        assert!(config.validate().is_err());

        let mut config = LogConfig::default();
        config.console.level = Some("verbose".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_level_override() {
        let config = LogConfig::default().with_level_override(Some(" debug "));
        assert_eq!(config.level, "debug");

        let config = LogConfig::default().with_level_override(Some(""));
        assert_eq!(config.level, "info");

        let config = LogConfig::default().with_level_override(None);
        assert_eq!(config.level, "info");
    }
}
