//! Arrow schema derivation and record to Arrow conversion
//!
//! Column order follows the stream's columns, then the order in which
//! additional fields are first seen, so every batch of a stream gets the
//! same layout.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::stream::StreamDescriptor;
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, ListArray, NullArray, StringArray,
    StructArray,
};
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::sync::Arc;

/// Infer an Arrow schema from records
///
/// Fields keep first-seen order; every field is nullable. Fields that are
/// null in every record become `Utf8`.
pub fn infer_schema(records: &[Record]) -> Schema {
    let mut fields: Vec<(String, DataType)> = Vec::new();
    extend_inferred(&mut fields, records);
    Schema::new(
        fields
            .into_iter()
            .map(|(name, dtype)| Field::new(name, finalize(dtype), true))
            .collect::<Vec<_>>(),
    )
}

/// Schema for one batch of a stream
///
/// Declared columns come first with types derived from their SQL types;
/// fields missing from the declaration are appended in first-seen order.
pub fn stream_schema(descriptor: &StreamDescriptor, records: &[Record]) -> Schema {
    let mut fields: Vec<(String, DataType)> = descriptor
        .columns
        .iter()
        .map(|c| (c.name.clone(), arrow_type_for_sql(&c.data_type)))
        .collect();
    extend_inferred(&mut fields, records);

    Schema::new(
        fields
            .into_iter()
            .map(|(name, dtype)| Field::new(name, finalize(dtype), true))
            .collect::<Vec<_>>(),
    )
}

/// Convert records to an Arrow RecordBatch with the given schema
///
/// Fields absent from a record become nulls.
pub fn records_to_batch(records: &[Record], schema: &Schema) -> Result<RecordBatch> {
    let schema = Arc::new(schema.clone());
    if records.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let values: Vec<Option<&Value>> = records.iter().map(|r| r.get(field.name())).collect();
        columns.push(build_array(&values, field.data_type())?);
    }

    RecordBatch::try_new(schema, columns)
        .map_err(|e| Error::output(format!("Failed to create RecordBatch: {e}")))
}

/// Arrow type used for a source column
///
/// Only types whose record representation is a plain JSON number or
/// boolean get a native Arrow type; everything else is carried as text.
pub fn arrow_type_for_sql(data_type: &str) -> DataType {
    let upper = data_type.trim().to_uppercase();
    match upper.as_str() {
        "BOOLEAN" | "BOOL" => DataType::Boolean,
        "TINYINT" | "SMALLINT" | "INTEGER" | "INT" | "BIGINT" | "UTINYINT" | "USMALLINT"
        | "UINTEGER" | "INT2" | "INT4" | "INT8" => DataType::Int64,
        "DOUBLE" | "FLOAT" | "REAL" | "FLOAT4" | "FLOAT8" => DataType::Float64,
        _ => DataType::Utf8,
    }
}

fn extend_inferred(fields: &mut Vec<(String, DataType)>, records: &[Record]) {
    for record in records {
        for (key, value) in record.iter() {
            let inferred = infer_type(value);
            match fields.iter_mut().find(|(name, _)| name == key) {
                Some((_, existing)) => *existing = merge_types(existing, &inferred),
                None => fields.push((key.to_string(), inferred)),
            }
        }
    }
}

fn finalize(dtype: DataType) -> DataType {
    match dtype {
        DataType::Null => DataType::Utf8,
        other => other,
    }
}

/// Infer Arrow DataType from a JSON value
fn infer_type(value: &Value) -> DataType {
    match value {
        Value::Null => DataType::Null,
        Value::Bool(_) => DataType::Boolean,
        Value::Number(n) => {
            if n.is_i64() {
                DataType::Int64
            } else {
                DataType::Float64
            }
        }
        Value::String(_) => DataType::Utf8,
        Value::Array(arr) => {
            let element_type = arr
                .iter()
                .find(|v| !v.is_null())
                .map_or(DataType::Utf8, infer_type);
            DataType::List(Arc::new(Field::new("item", element_type, true)))
        }
        Value::Object(obj) => {
            let fields: Vec<Field> = obj
                .iter()
                .map(|(k, v)| Field::new(k, finalize(infer_type(v)), true))
                .collect();
            DataType::Struct(Fields::from(fields))
        }
    }
}

/// Merge two data types into a compatible type
fn merge_types(type1: &DataType, type2: &DataType) -> DataType {
    match (type1, type2) {
        (a, b) if a == b => a.clone(),

        // Null can merge with anything
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),

        // Mixed integers and floats become Float64
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }

        // Anything else falls back to text
        _ => DataType::Utf8,
    }
}

/// Build an Arrow array from JSON values
fn build_array(values: &[Option<&Value>], data_type: &DataType) -> Result<ArrayRef> {
    match data_type {
        DataType::Null => Ok(Arc::new(NullArray::new(values.len()))),

        DataType::Boolean => {
            let arr: BooleanArray = values.iter().map(|v| v.and_then(Value::as_bool)).collect();
            Ok(Arc::new(arr))
        }

        DataType::Int64 => {
            let arr: Int64Array = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
            Ok(Arc::new(arr))
        }

        DataType::Float64 => {
            let arr: Float64Array = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
            Ok(Arc::new(arr))
        }

        DataType::List(field) => build_list_array(values, field),

        DataType::Struct(fields) => build_struct_array(values, fields),

        // Utf8 and anything unexpected: strings as-is, other values as JSON text
        _ => {
            let arr: StringArray = values
                .iter()
                .map(|v| {
                    v.filter(|v| !v.is_null()).map(|v| match v {
                        Value::String(s) => s.clone(),
                        _ => v.to_string(),
                    })
                })
                .collect();
            Ok(Arc::new(arr))
        }
    }
}

/// Build a list array from JSON arrays
fn build_list_array(values: &[Option<&Value>], field: &Arc<Field>) -> Result<ArrayRef> {
    let mut all_items: Vec<Option<&Value>> = Vec::new();
    let mut offsets: Vec<i32> = vec![0];

    for value in values {
        if let Some(Value::Array(arr)) = value {
            all_items.extend(arr.iter().map(Some));
        }
        let offset = i32::try_from(all_items.len())
            .map_err(|_| Error::output("Array too large for i32 offset"))?;
        offsets.push(offset);
    }

    let items_array = build_array(&all_items, field.data_type())?;
    let offset_buffer = OffsetBuffer::new(offsets.into());

    let list_array = ListArray::try_new(Arc::clone(field), offset_buffer, items_array, None)?;
    Ok(Arc::new(list_array))
}

/// Build a struct array from JSON objects
fn build_struct_array(values: &[Option<&Value>], fields: &Fields) -> Result<ArrayRef> {
    let mut child_arrays: Vec<ArrayRef> = Vec::with_capacity(fields.len());

    for field in fields {
        let child_values: Vec<Option<&Value>> = values
            .iter()
            .map(|v| v.and_then(|v| v.as_object()).and_then(|obj| obj.get(field.name())))
            .collect();
        child_arrays.push(build_array(&child_values, field.data_type())?);
    }

    let struct_array = StructArray::try_new(fields.clone(), child_arrays, None)?;
    Ok(Arc::new(struct_array))
}
