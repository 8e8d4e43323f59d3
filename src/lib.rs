// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # tablesync
//!
//! A minimal, Rust-native pipeline that extracts relational tables into
//! Parquet files, a DuckDB warehouse or JSON lines, with per-stream
//! incremental checkpoints.
//!
//! ## Features
//!
//! - **Database Sources**: PostgreSQL, MySQL, SQLite and DuckDB through DuckDB's scanners
//! - **Incremental Sync**: Typed cursor checkpoints, committed once per stream
//! - **Multiple Sinks**: Partitioned Parquet (local or object storage), DuckDB warehouse, stdout
//! - **YAML Pipelines**: One file describes source, destinations and sync settings
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tablesync::{config::PipelineConfig, engine::SyncOrchestrator, state::StateManager};
//!
//! #[tokio::main]
//! async fn main() -> tablesync::Result<()> {
//!     let pipeline = PipelineConfig::load("pipeline.yaml")?;
//!     let source = pipeline.build_source()?;
//!     let sinks = pipeline.build_sinks()?;
//!     let state = StateManager::from_file("state.json")?;
//!
//!     let mut orchestrator =
//!         SyncOrchestrator::new(Box::new(source), sinks, state, pipeline.sync_config())?;
//!     let report = orchestrator.run().await?;
//!     println!("{} records", report.total_records);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SyncOrchestrator                        │
//! │   check → discover → per stream: read → batch → commit       │
//! └──────────────────────────────────────────────────────────────┘
//!          │                     │                     │
//! ┌────────┴────────┐   ┌────────┴────────┐   ┌────────┴────────┐
//! │     Source      │   │      Sinks      │   │  StateManager   │
//! ├─────────────────┤   ├─────────────────┤   ├─────────────────┤
//! │ DuckDB attach   │   │ Parquet parts   │   │ Flat JSON file  │
//! │ Paged reads     │   │ DuckDB upserts  │   │ Atomic commits  │
//! │ Typed cursors   │   │ JSON lines      │   │                 │
//! └─────────────────┘   └─────────────────┘   └─────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Records flowing from streams to sinks
pub mod record;

/// Typed cursor values and checkpoint policy
pub mod cursor;

/// Stream trait and descriptors
pub mod stream;

/// Source trait, connection checks and catalogs
pub mod source;

/// Database sources via DuckDB
pub mod database;

/// State management and checkpointing
pub mod state;

/// Arrow/Parquet output
pub mod output;

/// Sink implementations
pub mod sink;

/// Sync orchestration
pub mod engine;

/// Pipeline configuration
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::PipelineConfig;
pub use engine::{SyncConfig, SyncOrchestrator, SyncReport};
pub use record::Record;
pub use sink::SinkWriter;
pub use source::Source;
pub use state::StateManager;
pub use stream::Stream;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
