use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "logkeep", about = "Log ingestion and archival")]
pub struct Cli {
    /// Diagnostic log level (trace, debug, info, warn, error); RUST_LOG wins
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a logger and emit events at every level
    Demo {
        /// TOML logger configuration; development preset when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also persist events into this redb database
        #[arg(long)]
        db: Option<PathBuf>,
        /// Rounds of events to emit
        #[arg(long, default_value_t = 1)]
        rounds: u32,
        /// Pause between rounds, in milliseconds
        #[arg(long, default_value_t = 0)]
        pause_ms: u64,
    },
    /// Archive rotated log files now
    Archive {
        /// Directory holding rotated log files
        #[arg(long, default_value = "./logs")]
        log_dir: PathBuf,
        /// Directory receiving archives
        #[arg(long, default_value = "./logs/archive")]
        archive_dir: PathBuf,
        /// Logger name used in archive names
        #[arg(long, default_value = "logkeep")]
        logger_name: String,
        /// Files per archive
        #[arg(long, default_value_t = 100)]
        chunk_size: usize,
        /// Also archive a trailing chunk smaller than chunk-size
        #[arg(long)]
        flush_partial: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the most recent records from a redb database
    Records {
        /// Database file
        db: PathBuf,
        /// Number of records
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_defaults() {
        let cli = Cli::try_parse_from(["logkeep", "archive"]).unwrap();
        match cli.command {
            Command::Archive {
                log_dir,
                chunk_size,
                flush_partial,
                ..
            } => {
                assert_eq!(log_dir, PathBuf::from("./logs"));
                assert_eq!(chunk_size, 100);
                assert!(!flush_partial);
            }
            _ => panic!("expected archive command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_records_arguments() {
        let cli = Cli::try_parse_from([
            "logkeep",
            "records",
            "/tmp/logs.redb",
            "--limit",
            "5",
            "--json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(
            cli.command,
            Command::Records { limit: 5, json: true, .. }
        ));
    }
}
