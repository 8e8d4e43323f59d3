//! Sink writers
//!
//! A sink receives batches of records for one stream at a time. Each batch
//! either lands completely or the call returns an error; the orchestrator
//! only advances checkpoints after every healthy sink accepted a batch.
//!
//! Available sinks:
//! - [`ParquetSink`] - one Parquet part file per batch on local disk or object storage
//! - [`WarehouseSink`] - one DuckDB table per stream, upserted by primary key
//! - [`JsonLinesSink`] - RECORD messages as JSON lines

mod jsonl;
mod part_files;
mod warehouse;

pub use jsonl::JsonLinesSink;
pub use part_files::ParquetSink;
pub use warehouse::WarehouseSink;

use crate::error::Result;
use crate::record::Record;
use crate::stream::StreamDescriptor;
use async_trait::async_trait;

/// Destination for synchronized records
#[async_trait]
pub trait SinkWriter: Send + Sync {
    /// Unique sink name (for reports and logs)
    fn name(&self) -> &str;

    /// Write one batch of records of a stream
    ///
    /// Batches of the same stream arrive in read order.
    async fn write(&self, stream: &StreamDescriptor, batch: &[Record]) -> Result<()>;

    /// Flush and release resources at the end of a run
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
