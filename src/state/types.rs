//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs. The
//! persisted layout is a plain nested document:
//!
//! ```json
//! { "orders": { "updated_at": "2024-01-05" } }
//! ```

use crate::types::JsonValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resumable position of a pipeline: stream name to stream checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState {
    streams: BTreeMap<String, StreamState>,
}

impl SyncState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&StreamState> {
        self.streams.get(stream)
    }

    /// Replace the state for a stream
    pub fn set_stream(&mut self, stream: &str, state: StreamState) {
        self.streams.insert(stream.to_string(), state);
    }

    /// Remove the state for a stream, returning it
    pub fn remove_stream(&mut self, stream: &str) -> Option<StreamState> {
        self.streams.remove(stream)
    }

    /// Stream names with stored state, in name order
    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    /// Iterate over `(stream, state)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StreamState)> {
        self.streams.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of streams with stored state
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether no stream has state
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Checkpoint for a single stream: field name to last-seen value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamState {
    values: BTreeMap<String, JsonValue>,
}

impl StreamState {
    /// Create a new empty stream state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the checkpoint for a field
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.values.get(field)
    }

    /// Builder-style setter
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: JsonValue) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    /// Iterate over `(field, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether the state holds no checkpoint
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
