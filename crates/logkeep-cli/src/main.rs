mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use logkeep_logging::{ArchiveReport, ChunkArchiver, LogConfig, LoggerBuilder, LoggerLayer};
use logkeep_storage::{LogStore, RedbLogStore, RedbStoreConfig};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Command};

#[derive(Debug, Serialize)]
struct ChunkSummary {
    number: u32,
    files: usize,
    archive: PathBuf,
    digest: Option<String>,
}

#[derive(Debug, Serialize)]
struct ArchiveSummary {
    chunks: Vec<ChunkSummary>,
    archived_files: usize,
    unarchived_files: usize,
}

impl From<&ArchiveReport> for ArchiveSummary {
    fn from(report: &ArchiveReport) -> Self {
        Self {
            chunks: report
                .chunks
                .iter()
                .map(|chunk| ChunkSummary {
                    number: chunk.number,
                    files: chunk.file_count(),
                    archive: chunk.archive_path.clone(),
                    digest: chunk.digest.clone(),
                })
                .collect(),
            archived_files: report.archived_files(),
            unarchived_files: report.unarchived.len(),
        }
    }
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Demo {
            config,
            db,
            rounds,
            pause_ms,
        } => {
            let config = match config {
                Some(path) => LogConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => LogConfig::development(),
            }
            .with_env_overrides();

            let mut builder = LoggerBuilder::from_config(config);
            if let Some(db_path) = db {
                let store = RedbLogStore::open(RedbStoreConfig { db_path })?;
                builder = builder.with_store(Arc::new(store));
            }
            let logger = Arc::new(builder.build()?);

            // Diagnostics go to stderr; application tracing events also reach the logger
            tracing_subscriber::registry()
                .with(env_filter(&cli.log_level))
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(LoggerLayer::new(Arc::clone(&logger)))
                .init();

            for round in 0..rounds {
                emit_round(&logger, round);
                if pause_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(pause_ms)).await;
                }
            }

            logger.close();
            for stats in logger.sink_stats() {
                println!(
                    "store sink: submitted={} persisted={} failed={}",
                    stats.submitted, stats.persisted, stats.failed
                );
            }
        }

        Command::Archive {
            log_dir,
            archive_dir,
            logger_name,
            chunk_size,
            flush_partial,
            json,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(&cli.log_level))
                .with_writer(std::io::stderr)
                .init();

            let summary = run_archive(&logger_name, &log_dir, &archive_dir, chunk_size, flush_partial)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for chunk in &summary.chunks {
                    println!(
                        "chunk {}: {} files -> {}",
                        chunk.number,
                        chunk.files,
                        chunk.archive.display()
                    );
                }
                println!(
                    "archived {} files, {} left for a later run",
                    summary.archived_files, summary.unarchived_files
                );
            }
        }

        Command::Records { db, limit, json } => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(&cli.log_level))
                .with_writer(std::io::stderr)
                .init();

            if !db.exists() {
                anyhow::bail!("database {} does not exist", db.display());
            }
            let store = RedbLogStore::open(RedbStoreConfig { db_path: db })?;
            for (id, record) in store.recent(limit)? {
                if json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    println!(
                        "{id:>8} {} {} {}:{} {}",
                        record.level,
                        record.logger_name,
                        record.pathname,
                        record.lineno,
                        record.message
                    );
                }
            }
        }
    }

    Ok(())
}

fn emit_round(logger: &logkeep_logging::Logger, round: u32) {
    logger.trace(format!("round {round}: trace"));
    logger.debug(format!("round {round}: debug"));
    logger.info(format!("round {round}: info"));
    logger.warning(format!("round {round}: warning"));
    logger.error(format!("round {round}: error"));
    logger.critical(format!("round {round}: critical"));

    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "demo resource missing");
    logger.exception(format!("round {round}: exception"), &err);

    tracing::info!(target: "demo", round, "event routed through tracing");
}

fn run_archive(
    logger_name: &str,
    log_dir: &Path,
    archive_dir: &Path,
    chunk_size: usize,
    flush_partial: bool,
) -> anyhow::Result<ArchiveSummary> {
    anyhow::ensure!(chunk_size > 0, "chunk size must be greater than zero");
    let report = ChunkArchiver::new(logger_name, log_dir, archive_dir)
        .with_chunk_size(chunk_size)
        .with_flush_partial(flush_partial)
        .run()
        .with_context(|| format!("archiving {}", log_dir.display()))?;
    Ok(ArchiveSummary::from(&report))
}
