//! CLI commands and argument parsing

use crate::types::SyncMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sync relational tables into files and warehouses
#[derive(Parser, Debug)]
#[command(name = "tablesync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline definition file (YAML)
    #[arg(short, long, global = true, default_value = "pipeline.yaml")]
    pub config: PathBuf,

    /// State file (JSON); overrides `state_path` from the pipeline
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON (not persisted)
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Test connection to the source database
    Check,

    /// Describe available streams
    Discover,

    /// List available stream names
    Streams,

    /// Sync streams into the configured destinations
    Sync {
        /// Streams to sync (comma-separated, empty = all)
        #[arg(long, value_delimiter = ',')]
        streams: Vec<String>,

        /// Mode for streams without a per-stream override
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Commit state after every batch
        #[arg(long)]
        checkpoint_every_batch: bool,
    },

    /// Show or reset persisted state
    State {
        /// Forget the checkpoint of one stream
        #[arg(long, conflicts_with = "reset_all")]
        reset: Option<String>,

        /// Forget all checkpoints
        #[arg(long)]
        reset_all: bool,
    },
}

/// Sync mode argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    /// Read every row
    #[value(name = "full_refresh")]
    FullRefresh,
    /// Read rows past the stored checkpoint
    Incremental,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::FullRefresh => SyncMode::FullRefresh,
            ModeArg::Incremental => SyncMode::Incremental,
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
