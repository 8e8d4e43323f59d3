//! Warehouse sink backed by a DuckDB database file

use super::SinkWriter;
use crate::error::{Error, Result};
use crate::output::stream_schema;
use crate::record::Record;
use crate::stream::StreamDescriptor;
use arrow::datatypes::{DataType, Schema};
use async_trait::async_trait;
use duckdb::types::Value;
use duckdb::Connection;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Loads each stream into its own table
///
/// Tables are created on the first batch from the stream's Arrow schema.
/// Streams with a primary key are upserted, so replaying a batch after a
/// failed run leaves one row per key.
pub struct WarehouseSink {
    name: String,
    path: PathBuf,
    schema: Option<String>,
    inner: Mutex<Inner>,
}

struct Inner {
    conn: Option<Connection>,
    /// Stream name -> column names of its table
    tables: HashMap<String, Vec<String>>,
}

impl WarehouseSink {
    /// Open (or create) the warehouse database file
    pub fn open(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        schema: Option<String>,
    ) -> Result<Self> {
        let name = name.into();
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| {
            Error::sink_write(&name, format!("Failed to open {}: {e}", path.display()))
        })?;

        if let Some(schema) = &schema {
            conn.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {};", quote_ident(schema)))
                .map_err(|e| Error::sink_write(&name, format!("Failed to create schema: {e}")))?;
        }

        Ok(Self {
            name,
            path,
            schema,
            inner: Mutex::new(Inner {
                conn: Some(conn),
                tables: HashMap::new(),
            }),
        })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Qualified, quoted table name for a stream
    fn table_name(&self, stream: &str) -> String {
        let table = quote_ident(&stream.replace('.', "_"));
        match &self.schema {
            Some(schema) => format!("{}.{table}", quote_ident(schema)),
            None => table,
        }
    }

    fn create_table_sql(&self, stream: &StreamDescriptor, schema: &Schema) -> String {
        let mut columns: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| format!("{} {}", quote_ident(f.name()), sql_type(f.data_type())))
            .collect();

        if !stream.primary_key.is_empty() {
            let key = stream
                .primary_key
                .iter()
                .map(|k| quote_ident(k))
                .collect::<Vec<_>>()
                .join(", ");
            columns.push(format!("PRIMARY KEY ({key})"));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table_name(&stream.name),
            columns.join(", ")
        )
    }

    fn insert_sql(&self, stream: &StreamDescriptor, columns: &[String]) -> String {
        let verb = if stream.primary_key.is_empty() {
            "INSERT"
        } else {
            "INSERT OR REPLACE"
        };
        let names = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");

        format!(
            "{verb} INTO {} ({names}) VALUES ({placeholders})",
            self.table_name(&stream.name)
        )
    }
}

#[async_trait]
impl SinkWriter for WarehouseSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, stream: &StreamDescriptor, batch: &[Record]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        let Inner { conn, tables } = &mut *inner;
        let conn = conn
            .as_mut()
            .ok_or_else(|| Error::sink_write(&self.name, "warehouse is closed"))?;

        let schema = stream_schema(stream, batch);
        if !tables.contains_key(&stream.name) {
            let sql = self.create_table_sql(stream, &schema);
            tracing::debug!("Creating warehouse table: {sql}");
            conn.execute_batch(&sql).map_err(|e| {
                Error::sink_write(&self.name, format!("Failed to create table: {e}"))
            })?;
            tables.insert(
                stream.name.clone(),
                schema.fields().iter().map(|f| f.name().clone()).collect(),
            );
        }
        let columns = tables.get(&stream.name).cloned().unwrap_or_default();
        let types: Vec<DataType> = columns
            .iter()
            .map(|c| {
                schema
                    .field_with_name(c)
                    .map_or(DataType::Utf8, |f| f.data_type().clone())
            })
            .collect();

        let sql = self.insert_sql(stream, &columns);
        let map_err = |e: duckdb::Error| Error::sink_write(&self.name, e.to_string());

        // One transaction per batch; dropping it uncommitted rolls back
        let tx = conn.transaction().map_err(map_err)?;
        {
            let mut stmt = tx.prepare(&sql).map_err(map_err)?;
            for record in batch {
                let values = columns
                    .iter()
                    .zip(&types)
                    .map(|(c, t)| json_to_sql(record.get(c), t));
                stmt.execute(duckdb::params_from_iter(values))
                    .map_err(map_err)?;
            }
        }
        tx.commit().map_err(map_err)?;

        tracing::info!(
            "Loaded {} records into {}",
            batch.len(),
            self.table_name(&stream.name)
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(conn) = inner.conn.take() {
            conn.close()
                .map_err(|(_, e)| Error::sink_write(&self.name, format!("Failed to close: {e}")))?;
        }
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Boolean => "BOOLEAN",
        DataType::Int64 => "BIGINT",
        DataType::Float64 => "DOUBLE",
        _ => "VARCHAR",
    }
}

/// Convert a record value to a parameter for a column of the given type
fn json_to_sql(value: Option<&JsonValue>, data_type: &DataType) -> Value {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Value::Null;
    };

    match (data_type, value) {
        (DataType::Boolean, JsonValue::Bool(b)) => Value::Boolean(*b),
        (DataType::Int64, JsonValue::Number(n)) => n.as_i64().map_or(Value::Null, Value::BigInt),
        (DataType::Float64, JsonValue::Number(n)) => n.as_f64().map_or(Value::Null, Value::Double),
        (_, JsonValue::String(s)) => Value::Text(s.clone()),
        (_, other) => Value::Text(other.to_string()),
    }
}
