//! When archival runs
//!
//! Three policies are supported: once during logger setup
//! ([`run_on_init`]), on a timer ([`PeriodicArchiver`]), and on demand
//! (`Logger::archive_now` or the `logkeep archive` command, for external
//! schedulers). Archival is auxiliary: a failure is reported but never stops
//! a logger from accepting events.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::archiver::{ArchiveReport, ChunkArchiver};
use super::scanner::RotationScanner;
use crate::error::{ArchiveError, LogError};
use crate::outputs::FileOutput;

/// Run the archiver once, reporting and swallowing any failure
pub fn run_on_init(archiver: &ChunkArchiver) -> Option<ArchiveReport> {
    match archiver.run() {
        Ok(report) => Some(report),
        Err(e) => {
            error!(
                dir = %archiver.log_dir().display(),
                error = %e,
                "Failed to archive old log files"
            );
            None
        }
    }
}

/// Archive every scanned log file except the one still being written
pub fn archive_inactive(
    archiver: &ChunkArchiver,
    active: Option<&Path>,
) -> Result<ArchiveReport, ArchiveError> {
    let scan = RotationScanner::scan(archiver.log_dir());
    archiver.archive(scan.filter(|path| Some(path.as_path()) != active))
}

/// Rotate the active file (if any) and archive everything else
///
/// Nothing is touched once `stop` is set; a run in progress ends at the next
/// chunk boundary.
fn run_cycle(
    archiver: &ChunkArchiver,
    active: Option<&FileOutput>,
    stop: &AtomicBool,
) -> Result<ArchiveReport, LogError> {
    if stop.load(Ordering::Acquire) {
        return Ok(ArchiveReport {
            interrupted: true,
            ..ArchiveReport::default()
        });
    }
    let current = match active {
        Some(file) => {
            let closed = file.rotate()?;
            debug!(closed = %closed.display(), "Rotated active log file");
            Some(file.path())
        }
        None => None,
    };
    let current = current.as_deref();
    let scan = RotationScanner::scan(archiver.log_dir());
    Ok(archiver.archive_until(scan.filter(|path| Some(path.as_path()) != current), stop)?)
}

/// Background task archiving on a fixed interval
///
/// Each tick rotates the active log file first, so the file that was being
/// written becomes eligible, then runs the archiver on a blocking thread.
/// A failed tick is logged and the next one proceeds as normal.
pub struct PeriodicArchiver {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
    stopping: Arc<AtomicBool>,
    /// Held by a cycle for its whole run
    cycle: Arc<Mutex<()>>,
}

impl PeriodicArchiver {
    /// Spawn on the current tokio runtime
    ///
    /// Fails with a configuration error outside a runtime.
    pub fn spawn(
        archiver: Arc<ChunkArchiver>,
        interval: Duration,
        active: Option<Arc<FileOutput>>,
    ) -> Result<Self, LogError> {
        let runtime = Handle::try_current()
            .map_err(|_| LogError::config("periodic archival requires a running tokio runtime"))?;
        Self::spawn_on(&runtime, archiver, interval, active)
    }

    /// Spawn on the given runtime
    pub fn spawn_on(
        runtime: &Handle,
        archiver: Arc<ChunkArchiver>,
        interval: Duration,
        active: Option<Arc<FileOutput>>,
    ) -> Result<Self, LogError> {
        if interval.is_zero() {
            return Err(LogError::config("archive interval must be greater than zero"));
        }
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stopping = Arc::new(AtomicBool::new(false));
        let cycle = Arc::new(Mutex::new(()));
        let handle = runtime.spawn(run(
            archiver,
            interval,
            active,
            Arc::clone(&stopping),
            Arc::clone(&cycle),
            shutdown_rx,
        ));
        Ok(Self {
            shutdown_tx,
            handle,
            stopping,
            cycle,
        })
    }

    /// Ask the task to stop; a run in progress ends at its next chunk
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    /// Stop and block until no cycle is running
    ///
    /// When this returns no file is moved or archived by this task any more.
    /// Usable from synchronous code, including a runtime worker thread of a
    /// multi-threaded runtime.
    pub fn stop_and_wait(&self) {
        self.stop();
        drop(self.cycle.lock());
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop and wait for the task to exit
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Periodic archival task ended abnormally");
        }
    }
}

async fn run(
    archiver: Arc<ChunkArchiver>,
    period: Duration,
    active: Option<Arc<FileOutput>>,
    stopping: Arc<AtomicBool>,
    cycle: Arc<Mutex<()>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(interval_ms = period.as_millis() as u64, "Periodic archival started");

    let mut interval = tokio::time::interval(period);
    // The first tick fires immediately; the first run belongs one period later
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Periodic archival shutting down");
                break;
            }
            _ = interval.tick() => {
                let archiver = Arc::clone(&archiver);
                let active = active.clone();
                let stopping = Arc::clone(&stopping);
                let cycle = Arc::clone(&cycle);
                let outcome = tokio::task::spawn_blocking(move || {
                    let _running = cycle.lock();
                    run_cycle(&archiver, active.as_deref(), &stopping)
                })
                .await;

                match outcome {
                    Ok(Ok(report)) => debug!(
                        chunks = report.chunks.len(),
                        unarchived = report.unarchived.len(),
                        "Periodic archival cycle finished"
                    ),
                    Ok(Err(e)) => error!(error = %e, "Periodic archival cycle failed"),
                    Err(e) => error!(error = %e, "Periodic archival cycle panicked"),
                }
            }
        }
    }
}
