//! Chunked compression of rotated log files
//!
//! Files are archived in fixed-size chunks. For each chunk the files are
//! moved into a staging directory, the staging directory is written out as
//! one `tar.gz`, and only then is the staging directory removed. If
//! anything fails before the archive exists, the files stay in staging.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info, warn};

use super::scanner::RotationScanner;
use super::{archive_stem, create_log_dir};
use crate::error::ArchiveError;

/// Files per chunk unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// One archived batch of log files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveChunk {
    /// Position of the chunk within its run, starting at 0
    pub number: u32,
    /// Original paths of the archived files, in discovery order
    pub files: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub archive_path: PathBuf,
    /// BLAKE3 of the finished archive, hex encoded
    pub digest: Option<String>,
}

impl ArchiveChunk {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Outcome of one archival run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub chunks: Vec<ArchiveChunk>,
    /// Files left behind because they did not fill a chunk
    pub unarchived: Vec<PathBuf>,
    /// The run was told to stop before it reached the end of its input
    pub interrupted: bool,
}

impl ArchiveReport {
    /// Total number of files moved into archives
    pub fn archived_files(&self) -> usize {
        self.chunks.iter().map(ArchiveChunk::file_count).sum()
    }
}

/// Writes a staging directory out as a single archive file
pub trait ArchiveWriter: Send + Sync {
    /// Archive everything under `staging`, with entries rooted at `arcname/`
    fn write_archive(&self, staging: &Path, arcname: &str, destination: &Path) -> io::Result<()>;
}

/// tar + gzip archive writer
#[derive(Debug, Clone)]
pub struct TarGzWriter {
    level: Compression,
}

impl TarGzWriter {
    pub fn new(level: Compression) -> Self {
        Self { level }
    }
}

impl Default for TarGzWriter {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl ArchiveWriter for TarGzWriter {
    fn write_archive(&self, staging: &Path, arcname: &str, destination: &Path) -> io::Result<()> {
        let file = File::create(destination)?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, self.level));
        builder.append_dir_all(arcname, staging)?;
        let file = builder.into_inner()?.finish()?;
        file.sync_all()
    }
}

/// Groups rotated log files into chunks and archives each full chunk
pub struct ChunkArchiver {
    logger_name: String,
    log_dir: PathBuf,
    archive_dir: PathBuf,
    chunk_size: usize,
    flush_partial: bool,
    writer: Arc<dyn ArchiveWriter>,
}

impl ChunkArchiver {
    pub fn new(
        logger_name: impl Into<String>,
        log_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            logger_name: logger_name.into(),
            log_dir: log_dir.into(),
            archive_dir: archive_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            flush_partial: false,
            writer: Arc::new(TarGzWriter::default()),
        }
    }

    /// Set the number of files per chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Also archive a trailing chunk smaller than the chunk size
    ///
    /// Off by default: leftover files wait until a later run has enough of
    /// them to fill a chunk.
    pub fn with_flush_partial(mut self, flush_partial: bool) -> Self {
        self.flush_partial = flush_partial;
        self
    }

    /// Replace the archive writer
    pub fn with_writer(mut self, writer: Arc<dyn ArchiveWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Scan the log directory and archive what it holds
    pub fn run(&self) -> Result<ArchiveReport, ArchiveError> {
        self.archive(RotationScanner::scan(&self.log_dir))
    }

    /// Archive the given files, in order
    ///
    /// Stops at the first chunk that fails and returns its error; chunks
    /// already archived in this run stay archived.
    pub fn archive<I>(&self, paths: I) -> Result<ArchiveReport, ArchiveError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.archive_until(paths, &AtomicBool::new(false))
    }

    /// Archive the given files, checking `stop` before each chunk
    ///
    /// Once `stop` is set no further file is moved; the buffered files of the
    /// pending chunk are reported as unarchived and the report is marked
    /// interrupted.
    pub fn archive_until<I>(&self, paths: I, stop: &AtomicBool) -> Result<ArchiveReport, ArchiveError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        if self.chunk_size == 0 {
            return Err(ArchiveError::InvalidChunkSize);
        }
        if !self.log_dir.is_dir() {
            debug!(dir = %self.log_dir.display(), "Nothing to archive");
            return Ok(ArchiveReport::default());
        }
        create_log_dir(&self.archive_dir).map_err(|e| ArchiveError::io(&self.archive_dir, e))?;

        let mut report = ArchiveReport::default();
        let mut buffer = Vec::with_capacity(self.chunk_size);
        let mut chunk_number = 0u32;

        for path in paths {
            buffer.push(path);
            if buffer.len() >= self.chunk_size {
                if stop.load(Ordering::Acquire) {
                    report.interrupted = true;
                    break;
                }
                let files = std::mem::replace(&mut buffer, Vec::with_capacity(self.chunk_size));
                report.chunks.push(self.flush_chunk(chunk_number, files)?);
                chunk_number += 1;
            }
        }

        if !buffer.is_empty() {
            if self.flush_partial && !stop.load(Ordering::Acquire) {
                report.chunks.push(self.flush_chunk(chunk_number, buffer)?);
            } else {
                debug!(
                    remaining = buffer.len(),
                    chunk_size = self.chunk_size,
                    "Leaving partial chunk for a later run"
                );
                report.unarchived = buffer;
            }
        }

        info!(
            logger = %self.logger_name,
            chunks = report.chunks.len(),
            archived = report.archived_files(),
            unarchived = report.unarchived.len(),
            "Archival run complete"
        );
        Ok(report)
    }

    fn flush_chunk(&self, number: u32, files: Vec<PathBuf>) -> Result<ArchiveChunk, ArchiveError> {
        let created_at = Utc::now();
        let arcname = archive_stem(&self.logger_name, number, created_at.timestamp_micros());
        let staging = self.log_dir.join(&arcname);
        create_log_dir(&staging).map_err(|e| ArchiveError::io(&staging, e))?;

        for file in &files {
            let Some(file_name) = file.file_name() else {
                return Err(ArchiveError::Move {
                    path: file.clone(),
                    staging,
                    message: "path has no file name".to_string(),
                });
            };
            fs::rename(file, staging.join(file_name)).map_err(|e| ArchiveError::Move {
                path: file.clone(),
                staging: staging.clone(),
                message: e.to_string(),
            })?;
        }

        let archive_path = self.archive_dir.join(format!("{arcname}.tar.gz"));
        if let Err(e) = self.writer.write_archive(&staging, &arcname, &archive_path) {
            warn!(
                staging = %staging.display(),
                error = %e,
                "Compression failed; files left in staging"
            );
            if archive_path.exists() {
                if let Err(remove_err) = fs::remove_file(&archive_path) {
                    warn!(
                        archive = %archive_path.display(),
                        error = %remove_err,
                        "Failed to remove incomplete archive"
                    );
                }
            }
            return Err(ArchiveError::Compress {
                staging,
                message: e.to_string(),
            });
        }

        let digest = match digest_file(&archive_path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!(archive = %archive_path.display(), error = %e, "Failed to hash archive");
                None
            }
        };

        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!(staging = %staging.display(), error = %e, "Failed to remove staging directory");
        }

        debug!(
            chunk = number,
            files = files.len(),
            archive = %archive_path.display(),
            "Archived chunk"
        );
        Ok(ArchiveChunk {
            number,
            files,
            created_at,
            archive_path,
            digest,
        })
    }
}

fn digest_file(path: &Path) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
