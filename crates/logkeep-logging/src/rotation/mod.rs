//! Rotation and archival of closed log files
//!
//! [`RotationScanner`] finds rotated `.log` files, [`ChunkArchiver`] moves
//! them into staging directories in batches and compresses each batch into
//! one `tar.gz`, and the [`trigger`] module decides when that happens.
//!
//! File naming:
//!
//! - active logs: `{logger_name}_{epoch_micros}.log` under the log directory
//! - archives: `{logger_name}_log_archive_{chunk}_{epoch_micros}.tar.gz`
//!   under the archive directory

pub mod archiver;
pub mod scanner;
pub mod trigger;

pub use archiver::{
    ArchiveChunk, ArchiveReport, ArchiveWriter, ChunkArchiver, DEFAULT_CHUNK_SIZE, TarGzWriter,
};
pub use scanner::{RotationScanner, Scan};
pub use trigger::{PeriodicArchiver, archive_inactive, run_on_init};

use std::io;
use std::path::{Path, PathBuf};

/// Extension shared by every log file the scanner picks up
pub const LOG_EXTENSION: &str = "log";

/// Microseconds since the Unix epoch, UTC
pub fn epoch_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Path of a fresh active log file for `logger_name`
pub fn active_log_path(log_dir: &Path, logger_name: &str) -> PathBuf {
    log_dir.join(format!("{logger_name}_{}.{LOG_EXTENSION}", epoch_micros()))
}

/// Name shared by a chunk's staging directory and its archive (minus `.tar.gz`)
pub fn archive_stem(logger_name: &str, chunk_number: u32, epoch_micros: i64) -> String {
    format!("{logger_name}_log_archive_{chunk_number}_{epoch_micros}")
}

/// Create a directory (and parents) readable by owner and group only
pub(crate) fn create_log_dir(path: &Path) -> io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o750);
    }
    builder.create(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_log_path_naming() {
        let path = active_log_path(Path::new("/var/log/app"), "ingest");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("ingest_"));
        assert!(name.ends_with(".log"));
        let micros = &name["ingest_".len()..name.len() - ".log".len()];
        assert!(micros.parse::<i64>().is_ok());
    }

    #[test]
    fn test_archive_stem() {
        assert_eq!(
            archive_stem("ingest", 3, 1_700_000_000_123_456),
            "ingest_log_archive_3_1700000000123456"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_create_log_dir_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("a").join("b");
        create_log_dir(&dir).unwrap();
        create_log_dir(&dir).unwrap();

        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        // umask may only clear bits
        assert_eq!(mode & 0o027, 0);
    }
}
