//! Engine types
//!
//! Configuration, lifecycle phases and reports of the sync orchestrator.

use crate::error::{Error, Result};
use crate::state::{StreamState, SyncState};
use crate::stream::StreamDescriptor;
use crate::types::SyncMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Configuration for a sync run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records per batch handed to the sinks
    pub batch_size: usize,
    /// Commit stream state after every batch instead of at end of stream
    pub checkpoint_every_batch: bool,
    /// Mode for streams without an override
    pub default_mode: Option<SyncMode>,
    /// Streams to sync (empty = all)
    pub streams: Vec<String>,
    /// Per-stream mode overrides
    pub stream_modes: BTreeMap<String, SyncMode>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            checkpoint_every_batch: false,
            default_mode: None,
            streams: Vec::new(),
            stream_modes: BTreeMap::new(),
        }
    }
}

impl SyncConfig {
    /// Create a new sync config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set batch size
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Commit state after every batch
    #[must_use]
    pub fn with_checkpoint_every_batch(mut self, enabled: bool) -> Self {
        self.checkpoint_every_batch = enabled;
        self
    }

    /// Set the default mode
    #[must_use]
    pub fn with_default_mode(mut self, mode: SyncMode) -> Self {
        self.default_mode = Some(mode);
        self
    }

    /// Restrict the run to the named streams
    #[must_use]
    pub fn with_streams<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams = streams.into_iter().map(Into::into).collect();
        self
    }

    /// Override the mode of one stream
    #[must_use]
    pub fn with_stream_mode(mut self, stream: impl Into<String>, mode: SyncMode) -> Self {
        self.stream_modes.insert(stream.into(), mode);
        self
    }

    /// Mode for a stream
    ///
    /// Per-stream override, then the default mode, then incremental when
    /// the stream supports it.
    pub fn mode_for(&self, descriptor: &StreamDescriptor) -> SyncMode {
        if let Some(mode) = self.stream_modes.get(&descriptor.name) {
            return *mode;
        }
        if let Some(mode) = self.default_mode {
            return mode;
        }
        if descriptor.supports_incremental() {
            SyncMode::Incremental
        } else {
            SyncMode::FullRefresh
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::invalid_value("batch_size", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Lifecycle phase of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not started
    Idle,
    /// Checking source connectivity
    Checking,
    /// Discovering streams
    Discovering,
    /// Synchronizing one stream
    SyncingStream {
        /// Position in the run
        index: usize,
        /// Stream name
        stream: String,
    },
    /// Run finished
    Done,
    /// Run aborted by a fatal error
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "idle"),
            SyncPhase::Checking => write!(f, "checking"),
            SyncPhase::Discovering => write!(f, "discovering"),
            SyncPhase::SyncingStream { index, stream } => {
                write!(f, "syncing stream #{index} ({stream})")
            }
            SyncPhase::Done => write!(f, "done"),
            SyncPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    /// All records delivered and state committed
    Succeeded,
    /// The stream failed; its state was not advanced past the last commit
    Failed {
        /// Error message
        reason: String,
    },
}

/// Per-stream part of a [`SyncReport`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamReport {
    /// Stream name
    pub stream: String,
    /// Mode used (absent when the stream was never read)
    pub mode: Option<SyncMode>,
    /// Outcome
    #[serde(flatten)]
    pub status: StreamStatus,
    /// Records pulled from the source
    pub records_read: usize,
    /// Records accepted, per sink
    pub records_written: BTreeMap<String, usize>,
    /// Error message per failed sink
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sink_errors: BTreeMap<String, String>,
    /// Persisted state of the stream after the run
    pub state: StreamState,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl StreamReport {
    /// Create an empty, successful report
    pub fn new(stream: impl Into<String>, mode: Option<SyncMode>) -> Self {
        Self {
            stream: stream.into(),
            mode,
            status: StreamStatus::Succeeded,
            records_read: 0,
            records_written: BTreeMap::new(),
            sink_errors: BTreeMap::new(),
            state: StreamState::new(),
            duration_ms: 0,
        }
    }

    /// Mark the stream as failed
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = StreamStatus::Failed {
            reason: reason.into(),
        };
    }

    /// Whether the stream succeeded
    pub fn is_success(&self) -> bool {
        self.status == StreamStatus::Succeeded
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Every stream succeeded
    Succeeded,
    /// Some streams failed
    Partial,
    /// Every stream failed
    Failed,
}

/// Summary of a sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Overall outcome
    pub status: SyncStatus,
    /// Per-stream reports, in sync order
    pub streams: Vec<StreamReport>,
    /// Records read across all streams
    pub total_records: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Persisted state after the run
    pub state: SyncState,
}

impl SyncReport {
    /// Build a report from stream reports
    pub fn from_streams(streams: Vec<StreamReport>, state: SyncState, duration_ms: u64) -> Self {
        let failed = streams.iter().filter(|s| !s.is_success()).count();
        let status = if failed == 0 {
            SyncStatus::Succeeded
        } else if failed == streams.len() {
            SyncStatus::Failed
        } else {
            SyncStatus::Partial
        };

        Self {
            status,
            total_records: streams.iter().map(|s| s.records_read).sum(),
            streams,
            duration_ms,
            state,
        }
    }

    /// Whether any stream failed
    pub fn has_failures(&self) -> bool {
        self.status != SyncStatus::Succeeded
    }

    /// Look up a stream report
    pub fn stream(&self, name: &str) -> Option<&StreamReport> {
        self.streams.iter().find(|s| s.stream == name)
    }

    /// Names of failed streams
    pub fn failed_streams(&self) -> Vec<&str> {
        self.streams
            .iter()
            .filter(|s| !s.is_success())
            .map(|s| s.stream.as_str())
            .collect()
    }
}
