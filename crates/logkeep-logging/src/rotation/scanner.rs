//! Discovery of archive-eligible log files

use std::ffi::OsStr;
use std::fs::{self, ReadDir};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::LOG_EXTENSION;

/// Finds rotated log files in a directory
///
/// The scanner keeps no state between calls: every [`scan`](Self::scan)
/// reflects the directory as it is listed at that moment. Excluding the file
/// that is still being written is the caller's job.
pub struct RotationScanner;

impl RotationScanner {
    /// Lazily list the log files in `log_dir`, in directory-listing order
    ///
    /// A missing directory yields nothing.
    pub fn scan(log_dir: impl AsRef<Path>) -> Scan {
        let dir = log_dir.as_ref().to_path_buf();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Log directory does not exist");
                None
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to list log directory");
                None
            }
        };
        Scan { dir, entries }
    }

    /// Whether a file name follows the log naming convention
    pub fn is_log_file_name(name: &OsStr) -> bool {
        let Some(name) = name.to_str() else {
            return false;
        };
        name.len() > LOG_EXTENSION.len() + 1
            && name
                .to_ascii_lowercase()
                .ends_with(&format!(".{LOG_EXTENSION}"))
    }
}

/// Iterator returned by [`RotationScanner::scan`]
pub struct Scan {
    dir: PathBuf,
    entries: Option<ReadDir>,
}

impl Scan {
    /// Directory being scanned
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Iterator for Scan {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        let entries = self.entries.as_mut()?;
        loop {
            let entry = match entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if !RotationScanner::is_log_file_name(&entry.file_name()) {
                continue;
            }

            let path = entry.path();
            let is_file = match entry.file_type() {
                Ok(file_type) if file_type.is_symlink() => path.is_file(),
                Ok(file_type) => file_type.is_file(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping entry of unknown type");
                    false
                }
            };
            if is_file {
                return Some(path);
            }
        }
    }
}
