//! State manager implementation
//!
//! Provides file-based state persistence with atomic writes. The manager is
//! the Sync State Store: the orchestrator loads a stream's checkpoint from it
//! before reading and commits the folded checkpoint back once the stream's
//! records have been written.

use super::types::{StreamState, SyncState};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// State manager for persisting and loading state
#[derive(Debug)]
pub struct StateManager {
    /// Path to the state file (empty for in-memory mode)
    path: PathBuf,
    /// Current state (cached)
    state: Arc<RwLock<SyncState>>,
}

impl StateManager {
    /// Create a new state manager with the given path, starting empty
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Arc::new(RwLock::new(SyncState::new())),
        }
    }

    /// Create an in-memory state manager (no file persistence)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(SyncState::new())),
        }
    }

    /// Create an in-memory state manager seeded with a state
    pub fn with_state(state: SyncState) -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Create a state manager from a file, loading existing state if present
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| Error::State {
                message: format!("Failed to read state file: {e}"),
            })?;
            parse_state(&contents)?
        } else {
            SyncState::new()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Create an in-memory state manager from an inline JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::with_state(parse_state(json)?))
    }

    /// Reload state from file, replacing the cached state
    pub async fn load(&self) -> Result<()> {
        if self.is_in_memory() || !self.path.exists() {
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::State {
                message: format!("Failed to read state file: {e}"),
            })?;

        let loaded = parse_state(&contents)?;
        let mut state = self.state.write().await;
        *state = loaded;

        Ok(())
    }

    /// Save current state to file
    pub async fn save(&self) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let state = self.state.read().await;
        write_atomic(&self.path, &state).await
    }

    /// Get a read lock on the current state
    pub async fn state(&self) -> tokio::sync::RwLockReadGuard<'_, SyncState> {
        self.state.read().await
    }

    /// Clone the current state
    pub async fn snapshot(&self) -> SyncState {
        self.state.read().await.clone()
    }

    /// Export state as pretty-printed JSON string
    pub async fn to_json_pretty(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string_pretty(&*state).map_err(|e| Error::State {
            message: format!("Failed to serialize state: {e}"),
        })
    }

    /// Get the stored checkpoint for a stream (empty if none)
    pub async fn stream_state(&self, stream: &str) -> StreamState {
        let state = self.state.read().await;
        state.get_stream(stream).cloned().unwrap_or_default()
    }

    /// Commit a stream checkpoint
    ///
    /// The update and the file write happen under one write lock, so
    /// commits from concurrent callers are applied one at a time. If the
    /// write fails the cached state is rolled back to its previous value.
    pub async fn commit_stream(&self, stream: &str, stream_state: StreamState) -> Result<()> {
        let mut state = self.state.write().await;
        let previous = state.get_stream(stream).cloned();
        state.set_stream(stream, stream_state);

        if self.is_in_memory() {
            return Ok(());
        }

        if let Err(e) = write_atomic(&self.path, &state).await {
            match previous {
                Some(prev) => state.set_stream(stream, prev),
                None => {
                    state.remove_stream(stream);
                }
            }
            return Err(e);
        }

        tracing::debug!("Committed state for stream {stream}");
        Ok(())
    }

    /// Clear all state
    pub async fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            *state = SyncState::new();
        }
        self.save().await
    }

    /// Clear state for a specific stream; returns whether anything was removed
    pub async fn clear_stream(&self, stream: &str) -> Result<bool> {
        let removed = {
            let mut state = self.state.write().await;
            state.remove_stream(stream).is_some()
        };
        self.save().await?;
        Ok(removed)
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

fn parse_state(contents: &str) -> Result<SyncState> {
    if contents.trim().is_empty() {
        return Ok(SyncState::new());
    }
    serde_json::from_str(contents).map_err(|e| Error::State {
        message: format!("Failed to parse state: {e}"),
    })
}

/// Write to a temp file first, then rename for atomicity
async fn write_atomic(path: &Path, state: &SyncState) -> Result<()> {
    let contents = serde_json::to_string_pretty(state)
        .map_err(|e| Error::checkpoint(format!("Failed to serialize state: {e}")))?;

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, &contents)
        .await
        .map_err(|e| Error::checkpoint(format!("Failed to write state file: {e}")))?;

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| Error::checkpoint(format!("Failed to rename state file: {e}")))?;

    Ok(())
}
