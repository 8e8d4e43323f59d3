//! Tests for output module

use super::*;
use crate::record::Record;
use crate::stream::{ColumnDescriptor, StreamDescriptor};
use arrow::array::{Array, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use chrono::NaiveDate;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

fn records(values: Vec<serde_json::Value>) -> Vec<Record> {
    values
        .into_iter()
        .map(|v| Record::from_value(v).unwrap())
        .collect()
}

fn field_names(schema: &arrow::datatypes::Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

// ============================================================================
// Schema Tests
// ============================================================================

#[test]
fn test_infer_schema_empty() {
    let schema = infer_schema(&[]);
    assert!(schema.fields().is_empty());
}

#[test]
fn test_infer_schema_keeps_first_seen_order() {
    let batch = records(vec![
        json!({"zeta": 1, "alpha": "a"}),
        json!({"alpha": "b", "mid": true, "zeta": 2}),
    ]);

    let schema = infer_schema(&batch);
    assert_eq!(field_names(&schema), vec!["zeta", "alpha", "mid"]);
    assert_eq!(schema.field(0).data_type(), &DataType::Int64);
    assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
    assert_eq!(schema.field(2).data_type(), &DataType::Boolean);
}

#[test]
fn test_infer_schema_merges_types() {
    let batch = records(vec![
        json!({"value": 42, "email": null, "mixed": 1}),
        json!({"value": 3.5, "email": "bob@example.com", "mixed": "one"}),
    ]);

    let schema = infer_schema(&batch);
    assert_eq!(
        schema.field_with_name("value").unwrap().data_type(),
        &DataType::Float64
    );
    assert_eq!(
        schema.field_with_name("email").unwrap().data_type(),
        &DataType::Utf8
    );
    assert_eq!(
        schema.field_with_name("mixed").unwrap().data_type(),
        &DataType::Utf8
    );
}

#[test]
fn test_all_null_field_becomes_text() {
    let schema = infer_schema(&records(vec![json!({"note": null})]));
    assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
}

#[test]
fn test_stream_schema_uses_declared_columns() {
    let descriptor = StreamDescriptor::new("orders").with_columns(vec![
        ColumnDescriptor::new("id", "BIGINT"),
        ColumnDescriptor::new("total", "DECIMAL(10,2)"),
        ColumnDescriptor::new("paid", "BOOLEAN"),
        ColumnDescriptor::new("updated_at", "TIMESTAMP"),
    ]);

    // The first batch may have only nulls in a column
    let batch = records(vec![json!({
        "id": 1, "total": null, "paid": null, "updated_at": "2024-01-05T10:30:00.000000Z", "extra": 2.5
    })]);

    let schema = stream_schema(&descriptor, &batch);
    assert_eq!(
        field_names(&schema),
        vec!["id", "total", "paid", "updated_at", "extra"]
    );
    assert_eq!(schema.field(0).data_type(), &DataType::Int64);
    assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
    assert_eq!(schema.field(2).data_type(), &DataType::Boolean);
    assert_eq!(schema.field(3).data_type(), &DataType::Utf8);
    assert_eq!(schema.field(4).data_type(), &DataType::Float64);
}

#[test]
fn test_arrow_type_for_sql() {
    assert_eq!(arrow_type_for_sql("integer"), DataType::Int64);
    assert_eq!(arrow_type_for_sql("DOUBLE"), DataType::Float64);
    assert_eq!(arrow_type_for_sql("BOOL"), DataType::Boolean);
    // Carried as strings in records
    assert_eq!(arrow_type_for_sql("HUGEINT"), DataType::Utf8);
    assert_eq!(arrow_type_for_sql("DATE"), DataType::Utf8);
}

// ============================================================================
// Conversion Tests
// ============================================================================

#[test]
fn test_records_to_batch() {
    let batch = records(vec![
        json!({"id": 1, "name": "Alice", "score": 9.5, "active": true}),
        json!({"id": 2, "name": null, "score": 7, "active": false}),
        json!({"id": 3}),
    ]);
    let schema = infer_schema(&batch);
    let rb = records_to_batch(&batch, &schema).unwrap();

    assert_eq!(rb.num_rows(), 3);
    assert_eq!(rb.num_columns(), 4);

    let ids = rb.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
    assert_eq!(ids.values().to_vec(), vec![1, 2, 3]);

    let names = rb.column(1).as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(names.value(0), "Alice");
    assert!(names.is_null(1));
    assert!(names.is_null(2));

    let scores = rb.column(2).as_any().downcast_ref::<Float64Array>().unwrap();
    assert_eq!(scores.value(1), 7.0);

    let active = rb.column(3).as_any().downcast_ref::<BooleanArray>().unwrap();
    assert!(active.value(0));
    assert!(active.is_null(2));
}

#[test]
fn test_records_to_batch_nested() {
    let batch = records(vec![
        json!({"tags": ["a", "b"], "user": {"id": 1}}),
        json!({"tags": [], "user": {"id": 2}}),
    ]);
    let schema = infer_schema(&batch);
    let rb = records_to_batch(&batch, &schema).unwrap();
    assert_eq!(rb.num_rows(), 2);
    assert!(matches!(schema.field(0).data_type(), DataType::List(_)));
    assert!(matches!(schema.field(1).data_type(), DataType::Struct(_)));
}

#[test]
fn test_records_to_batch_empty() {
    let schema = infer_schema(&records(vec![json!({"id": 1})]));
    let rb = records_to_batch(&[], &schema).unwrap();
    assert_eq!(rb.num_rows(), 0);
    assert_eq!(rb.num_columns(), 1);
}

// ============================================================================
// Parquet Tests
// ============================================================================

#[test]
fn test_encode_parquet_roundtrip() {
    let batch = records(vec![
        json!({"id": 1, "name": "Alice"}),
        json!({"id": 2, "name": "Bob"}),
    ]);
    let schema = infer_schema(&batch);
    let rb = records_to_batch(&batch, &schema).unwrap();

    let bytes = encode_parquet(&rb, &ParquetWriterConfig::default()).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<_> = reader.collect::<std::result::Result<_, _>>().unwrap();

    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].num_rows(), 2);
    assert_eq!(field_names(&batches[0].schema()), vec!["id", "name"]);
}

#[test]
fn test_compression_names() {
    use parquet::basic::Compression;

    let config = ParquetWriterConfig::new()
        .with_compression_name("none")
        .unwrap();
    assert_eq!(config.compression(), Compression::UNCOMPRESSED);

    let config = ParquetWriterConfig::new()
        .with_compression_name("ZSTD")
        .unwrap();
    assert!(matches!(config.compression(), Compression::ZSTD(_)));

    assert!(ParquetWriterConfig::new()
        .with_compression_name("lz77")
        .is_err());
}

// ============================================================================
// Destination Tests
// ============================================================================

#[test]
fn test_build_partitioned_path() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    assert_eq!(
        build_partitioned_path("orders", date, "20240105T103000", 3, "parquet"),
        "orders/dt=2024-01-05/part-20240105T103000-00003.parquet"
    );
    assert_eq!(
        build_partitioned_path("sales.orders", date, "r1", 0, "parquet"),
        "sales_orders/dt=2024-01-05/part-r1-00000.parquet"
    );
}

#[test]
fn test_parse_local_path() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("lake");
    let dest = CloudDestination::parse(path.to_str().unwrap()).unwrap();
    assert_eq!(dest.scheme(), "file");
    assert!(!dest.is_cloud());
    assert!(path.exists());
}

#[tokio::test]
async fn test_local_write() {
    let temp_dir = tempdir().unwrap();
    let dest = CloudDestination::parse(temp_dir.path().to_str().unwrap()).unwrap();

    let full_path = dest
        .write("orders/dt=2024-01-05/part.parquet", bytes::Bytes::from_static(b"PAR1"))
        .await
        .unwrap();

    assert!(full_path.starts_with("file://"));
    let written = std::fs::read(temp_dir.path().join("orders/dt=2024-01-05/part.parquet")).unwrap();
    assert_eq!(written, b"PAR1");
}
