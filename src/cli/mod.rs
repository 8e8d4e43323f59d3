//! CLI module
//!
//! Command-line interface for running pipelines.
//!
//! # Commands
//!
//! - `check` - Test connection to the source database
//! - `discover` - Describe available streams
//! - `streams` - List stream names
//! - `sync` - Sync streams into the destinations
//! - `state` - Show or reset persisted state

mod commands;
mod runner;

pub use commands::{Cli, Commands, ModeArg, OutputFormat};
pub use runner::Runner;
