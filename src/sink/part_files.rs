//! Parquet part-file sink

use super::SinkWriter;
use crate::error::Result;
use crate::output::{
    build_partitioned_path, encode_parquet, records_to_batch, stream_schema, CloudDestination,
    ParquetWriterConfig,
};
use crate::record::Record;
use crate::stream::StreamDescriptor;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Writes every batch as its own Parquet file
///
/// Files land at `{stream}/dt={YYYY-MM-DD}/part-{run}-{seq}.parquet`, so a
/// replayed batch adds a file instead of corrupting an existing one.
pub struct ParquetSink {
    name: String,
    destination: CloudDestination,
    config: ParquetWriterConfig,
    run_id: String,
    seq: AtomicU64,
}

impl ParquetSink {
    /// Create a sink writing under `path` (local path or object store URL)
    pub fn new(name: impl Into<String>, path: &str, config: ParquetWriterConfig) -> Result<Self> {
        let name = name.into();
        let destination = CloudDestination::parse(path)?;
        if destination.is_cloud() {
            tracing::info!(
                "Sink {name} uploads part files to {} storage",
                destination.scheme()
            );
        }
        Ok(Self {
            name,
            destination,
            config,
            run_id: Utc::now().format("%Y%m%dT%H%M%S%3f").to_string(),
            seq: AtomicU64::new(0),
        })
    }

    /// Identifier embedded in part file names for this run
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

#[async_trait]
impl SinkWriter for ParquetSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, stream: &StreamDescriptor, batch: &[Record]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let schema = stream_schema(stream, batch);
        let record_batch = records_to_batch(batch, &schema)?;
        let data = encode_parquet(&record_batch, &self.config)?;

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let filename = build_partitioned_path(
            &stream.name,
            Utc::now().date_naive(),
            &self.run_id,
            seq,
            "parquet",
        );

        let written = self.destination.write(&filename, data).await?;
        tracing::info!("Wrote {} records to {written}", batch.len());
        Ok(())
    }
}
