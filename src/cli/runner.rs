//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::engine::{SyncOrchestrator, SyncReport};
use crate::error::{Result, ResultExt};
use crate::source::Source;
use crate::state::StateManager;
use crate::types::SyncMode;
use serde_json::{json, Value};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command; `Ok(false)` means the command ran but failed
    pub async fn run(&self) -> Result<bool> {
        let pipeline = PipelineConfig::load(&self.cli.config)?;

        match &self.cli.command {
            Commands::Check => self.check(&pipeline).await,
            Commands::Discover => self.discover(&pipeline).await,
            Commands::Streams => self.streams(&pipeline).await,
            Commands::Sync {
                streams,
                mode,
                batch_size,
                checkpoint_every_batch,
            } => {
                let mode = mode.map(SyncMode::from);
                self.sync(&pipeline, streams, mode, *batch_size, *checkpoint_every_batch)
                    .await
            }
            Commands::State { reset, reset_all } => {
                self.state(&pipeline, reset.as_deref(), *reset_all).await
            }
        }
    }

    /// Load state: inline JSON, then `--state`, then the pipeline's state path
    fn load_state(&self, pipeline: &PipelineConfig) -> Result<StateManager> {
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = self.cli.state.as_ref().or(pipeline.state_path.as_ref()) {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    /// Check connection
    async fn check(&self, pipeline: &PipelineConfig) -> Result<bool> {
        let source = pipeline.build_source()?;
        tracing::info!("Checking connection to {}", source.connection_info());
        let result = source.check_connection().await;

        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": {
                "status": if result.success { "SUCCEEDED" } else { "FAILED" },
                "message": result.message,
            }
        }));

        Ok(result.success)
    }

    /// Discover streams
    async fn discover(&self, pipeline: &PipelineConfig) -> Result<bool> {
        let source = pipeline.build_source()?;
        let catalog = source.discover().await?;

        self.output_message(&json!({
            "type": "CATALOG",
            "catalog": catalog,
        }));

        Ok(true)
    }

    /// List available stream names
    async fn streams(&self, pipeline: &PipelineConfig) -> Result<bool> {
        let source = pipeline.build_source()?;
        let streams = source.list_streams().await?;
        let names: Vec<&str> = streams.iter().map(|s| s.name()).collect();

        self.output_message(&json!({
            "type": "STREAMS",
            "streams": names,
        }));

        Ok(true)
    }

    /// Run a sync
    async fn sync(
        &self,
        pipeline: &PipelineConfig,
        streams: &[String],
        mode: Option<SyncMode>,
        batch_size: Option<usize>,
        checkpoint_every_batch: bool,
    ) -> Result<bool> {
        let mut config = pipeline.sync_config();
        if !streams.is_empty() {
            config = config.with_streams(streams.iter().cloned());
        }
        if let Some(mode) = mode {
            config = config.with_default_mode(mode);
        }
        if let Some(size) = batch_size {
            config = config.with_batch_size(size);
        }
        if checkpoint_every_batch {
            config = config.with_checkpoint_every_batch(true);
        }

        let source = pipeline.build_source()?;
        let sinks = pipeline.build_sinks()?;
        let state = self.load_state(pipeline)?;

        let mut orchestrator =
            SyncOrchestrator::new(Box::new(source), sinks, state.clone(), config)?;
        let report = orchestrator.run().await?;

        self.output_message(&json!({
            "type": "STATE",
            "state": report.state,
        }));
        self.output_message(&self.summary(pipeline, &state, &report));

        Ok(!report.has_failures())
    }

    fn summary(&self, pipeline: &PipelineConfig, state: &StateManager, report: &SyncReport) -> Value {
        let failed = report.failed_streams().len();
        json!({
            "type": "SYNC_SUMMARY",
            "summary": {
                "status": report.status,
                "source": pipeline.source.name,
                "total_records": report.total_records,
                "total_streams": report.streams.len(),
                "successful_streams": report.streams.len() - failed,
                "failed_streams": failed,
                "duration_ms": report.duration_ms,
                "destinations": pipeline.destinations.iter().map(|d| d.name()).collect::<Vec<_>>(),
                "state_file": (!state.is_in_memory()).then(|| state.path().display().to_string()),
                "streams": report.streams,
            }
        })
    }

    /// Show or reset state
    async fn state(
        &self,
        pipeline: &PipelineConfig,
        reset: Option<&str>,
        reset_all: bool,
    ) -> Result<bool> {
        let state = self.load_state(pipeline)?;

        if reset_all {
            state.clear().await?;
            tracing::info!("Cleared all stream state");
        } else if let Some(stream) = reset {
            if state.clear_stream(stream).await? {
                tracing::info!("Cleared state for stream {stream}");
            } else {
                tracing::warn!("No state stored for stream {stream}");
            }
        }

        let snapshot = serde_json::to_value(state.snapshot().await)
            .context("Failed to render state")?;
        self.output_message(&json!({
            "type": "STATE",
            "state": snapshot,
        }));

        Ok(true)
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}
