//! Execution engine module
//!
//! Drives one sync run: connection check, discovery, then every selected
//! stream in turn through the sinks with checkpointing.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncOrchestrator` - Runs streams into sinks and commits state
//! - `SyncConfig` - Batch size, stream selection and mode choices
//! - `SyncReport` / `StreamReport` - Run summary

mod types;

pub use types::{SyncConfig, SyncPhase, SyncReport, SyncStatus, StreamReport, StreamStatus};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::sink::SinkWriter;
use crate::source::Source;
use crate::state::{StateManager, StreamState};
use crate::stream::Stream;
use crate::types::SyncMode;
use futures::StreamExt;
use std::collections::HashSet;
use std::time::Instant;

/// A stream selected for the run, or a selected name the source lacks
enum Planned {
    Found(Box<dyn Stream>),
    Missing(String),
}

impl Planned {
    fn name(&self) -> &str {
        match self {
            Planned::Found(stream) => stream.name(),
            Planned::Missing(name) => name,
        }
    }
}

/// Orchestrates a sync run from one source into one or more sinks
pub struct SyncOrchestrator {
    /// Source to read from
    source: Box<dyn Source>,
    /// Sinks receiving every batch
    sinks: Vec<Box<dyn SinkWriter>>,
    /// State store (only writer during a run)
    state: StateManager,
    /// Sync configuration
    config: SyncConfig,
    /// Current phase
    phase: SyncPhase,
}

impl SyncOrchestrator {
    /// Create a new orchestrator
    ///
    /// Fails with a configuration error for a zero batch size, no sinks or
    /// duplicate sink names.
    pub fn new(
        source: Box<dyn Source>,
        sinks: Vec<Box<dyn SinkWriter>>,
        state: StateManager,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;

        if sinks.is_empty() {
            return Err(Error::config("At least one sink is required"));
        }
        let mut names = HashSet::new();
        for sink in &sinks {
            if !names.insert(sink.name()) {
                return Err(Error::config(format!(
                    "Duplicate sink name: {}",
                    sink.name()
                )));
            }
        }

        Ok(Self {
            source,
            sinks,
            state,
            config,
            phase: SyncPhase::Idle,
        })
    }

    /// Current phase
    pub fn phase(&self) -> &SyncPhase {
        &self.phase
    }

    /// State store
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Sync configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run the sync
    ///
    /// Stream failures are recorded in the report; only fatal errors
    /// (failed connection check, discovery, state persistence) are returned.
    pub async fn run(&mut self) -> Result<SyncReport> {
        let start = Instant::now();
        tracing::info!("Starting sync from source {}", self.source.name());

        match self.execute(start).await {
            Ok(report) => {
                self.transition(SyncPhase::Done);
                tracing::info!(
                    "Sync finished: {:?}, {} records in {} ms",
                    report.status,
                    report.total_records,
                    report.duration_ms
                );
                Ok(report)
            }
            Err(e) => {
                self.transition(SyncPhase::Failed);
                tracing::error!("Sync failed: {e}");
                Err(e)
            }
        }
    }

    fn transition(&mut self, phase: SyncPhase) {
        tracing::info!("Sync phase: {} -> {phase}", self.phase);
        self.phase = phase;
    }

    async fn execute(&mut self, start: Instant) -> Result<SyncReport> {
        self.transition(SyncPhase::Checking);
        let check = self.source.check_connection().await;
        if !check.success {
            return Err(Error::ConnectionCheck {
                message: check
                    .message
                    .unwrap_or_else(|| "connection check failed".to_string()),
            });
        }

        self.transition(SyncPhase::Discovering);
        let catalog = self.source.discover().await.map_err(as_discovery_error)?;
        let streams = self
            .source
            .list_streams()
            .await
            .map_err(as_discovery_error)?;
        tracing::info!(
            "Discovered {} streams: {}",
            catalog.streams.len(),
            catalog.stream_names().join(", ")
        );

        let plan = self.plan(streams);
        let mut reports = Vec::with_capacity(plan.len());

        for (index, planned) in plan.into_iter().enumerate() {
            self.transition(SyncPhase::SyncingStream {
                index,
                stream: planned.name().to_string(),
            });

            let report = match planned {
                Planned::Found(stream) => self.sync_stream(stream.as_ref()).await?,
                Planned::Missing(name) => {
                    let err = Error::StreamNotFound {
                        stream: name.clone(),
                    };
                    tracing::error!("{err}");
                    let mut report = StreamReport::new(&name, None);
                    report.fail(err.to_string());
                    report
                }
            };
            reports.push(report);
        }

        self.state.save().await?;

        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                tracing::warn!("Failed to close sink {}: {e}", sink.name());
            }
        }

        let duration_ms = elapsed_ms(start);
        Ok(SyncReport::from_streams(
            reports,
            self.state.snapshot().await,
            duration_ms,
        ))
    }

    /// Apply stream selection; the plan is ordered by stream name
    fn plan(&self, streams: Vec<Box<dyn Stream>>) -> Vec<Planned> {
        let mut plan: Vec<Planned> = if self.config.streams.is_empty() {
            streams.into_iter().map(Planned::Found).collect()
        } else {
            let wanted: HashSet<&str> = self.config.streams.iter().map(String::as_str).collect();
            let available: HashSet<String> =
                streams.iter().map(|s| s.name().to_string()).collect();

            let mut plan: Vec<Planned> = streams
                .into_iter()
                .filter(|s| wanted.contains(s.name()))
                .map(Planned::Found)
                .collect();
            plan.extend(
                wanted
                    .into_iter()
                    .filter(|name| !available.contains(*name))
                    .map(|name| Planned::Missing(name.to_string())),
            );
            plan
        };

        plan.sort_by(|a, b| a.name().cmp(b.name()));
        plan
    }

    /// Sync one stream; only fatal errors are returned
    async fn sync_stream(&self, stream: &dyn Stream) -> Result<StreamReport> {
        let start = Instant::now();
        let name = stream.name().to_string();
        let mode = self.config.mode_for(stream.descriptor());

        let mut report = StreamReport::new(&name, Some(mode));
        for sink in &self.sinks {
            report.records_written.insert(sink.name().to_string(), 0);
        }

        let prior = self.state.stream_state(&name).await;
        tracing::info!("Syncing stream {name} ({mode})");

        match self.drain(stream, mode, &prior, &mut report).await {
            Ok(final_state) if report.sink_errors.is_empty() => {
                self.state.commit_stream(&name, final_state).await?;
                tracing::info!(
                    "Stream {name} complete: {} records",
                    report.records_read
                );
            }
            Ok(_) => {
                let failed: Vec<&str> = report.sink_errors.keys().map(String::as_str).collect();
                let reason = format!("sink write failed: {}", failed.join(", "));
                tracing::error!("Stream {name} failed: {reason}");
                report.fail(reason);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!("Stream {name} failed: {e}");
                report.fail(e.to_string());
            }
        }

        report.state = self.state.stream_state(&name).await;
        report.duration_ms = elapsed_ms(start);
        Ok(report)
    }

    /// Read the stream into the sinks, returning the folded state
    async fn drain(
        &self,
        stream: &dyn Stream,
        mode: SyncMode,
        prior: &StreamState,
        report: &mut StreamReport,
    ) -> Result<StreamState> {
        let batch_size = self.config.batch_size;
        let mut healthy: Vec<usize> = (0..self.sinks.len()).collect();
        let mut state = prior.clone();
        let mut buffer: Vec<Record> = Vec::with_capacity(batch_size);

        let mut records = stream.read_records(mode, None, Some(prior)).await?;
        while let Some(record) = records.next().await {
            buffer.push(record?);
            report.records_read += 1;

            if buffer.len() >= batch_size {
                state = self
                    .flush(stream, &mut buffer, state, &mut healthy, report)
                    .await?;
                if healthy.is_empty() {
                    tracing::warn!(
                        "All sinks failed for stream {}; abandoning read",
                        stream.name()
                    );
                    break;
                }
            }
        }
        // Release the read's connection before the final flush
        drop(records);

        if !buffer.is_empty() && !healthy.is_empty() {
            state = self
                .flush(stream, &mut buffer, state, &mut healthy, report)
                .await?;
        }

        Ok(state)
    }

    /// Write one batch to every healthy sink, then fold it into the state
    async fn flush(
        &self,
        stream: &dyn Stream,
        buffer: &mut Vec<Record>,
        state: StreamState,
        healthy: &mut Vec<usize>,
        report: &mut StreamReport,
    ) -> Result<StreamState> {
        let batch = std::mem::take(buffer);
        let descriptor = stream.descriptor();
        tracing::debug!("Writing batch of {} records for {}", batch.len(), stream.name());

        let mut still_healthy = Vec::with_capacity(healthy.len());
        for &index in healthy.iter() {
            let sink = &self.sinks[index];
            match sink.write(descriptor, &batch).await {
                Ok(()) => {
                    *report
                        .records_written
                        .entry(sink.name().to_string())
                        .or_default() += batch.len();
                    still_healthy.push(index);
                }
                Err(e) => {
                    let e = as_sink_error(sink.name(), e);
                    tracing::warn!("{e}; excluding sink for stream {}", stream.name());
                    report
                        .sink_errors
                        .insert(sink.name().to_string(), e.to_string());
                }
            }
        }
        *healthy = still_healthy;

        let next = batch
            .iter()
            .fold(state, |acc, record| stream.updated_state(None, &acc, record));

        if self.config.checkpoint_every_batch && report.sink_errors.is_empty() {
            self.state.commit_stream(stream.name(), next.clone()).await?;
        }

        *buffer = Vec::with_capacity(self.config.batch_size);
        Ok(next)
    }
}

fn as_discovery_error(e: Error) -> Error {
    match e {
        Error::Discovery { .. } => e,
        other => Error::discovery(other.to_string()),
    }
}

fn as_sink_error(sink: &str, e: Error) -> Error {
    match e {
        Error::SinkWrite { .. } => e,
        other => Error::sink_write(sink, other.to_string()),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests;
