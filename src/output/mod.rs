//! Output module
//!
//! Columnar encoding shared by the file and warehouse sinks:
//! - Arrow schemas derived from stream columns and record values
//! - Records to Arrow RecordBatches
//! - Parquet encoding
//! - Object storage destinations (local, S3, R2, GCS, Azure)

mod cloud;
mod schema;
mod writer;

pub use cloud::{build_partitioned_path, CloudDestination};
pub use schema::{arrow_type_for_sql, infer_schema, records_to_batch, stream_schema};
pub use writer::{encode_parquet, ParquetWriterConfig};

#[cfg(test)]
mod tests;
