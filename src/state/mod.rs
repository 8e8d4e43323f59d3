//! State management module
//!
//! Handles checkpoint tracking and resumability.
//! State is persisted between sync runs to enable incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `SyncState` - Stream name to checkpoint mapping for a whole pipeline
//! - `StreamState` - Field name to last checkpoint value for one stream
//! - `StateManager` - File-based persistence with atomic commits

mod manager;
mod types;

pub use manager::StateManager;
pub use types::{StreamState, SyncState};
