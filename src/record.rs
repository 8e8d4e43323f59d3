//! Records moved through the pipeline
//!
//! A [`Record`] is an ordered mapping of field name to JSON value. Field
//! order follows the source column order. Records carry no identity of
//! their own; primary keys belong to the owning stream.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};

/// A single row read from a stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(JsonObject);

impl Record {
    /// Build a record from an existing JSON object
    pub fn new(fields: JsonObject) -> Self {
        Self(fields)
    }

    /// Adapt a raw `(columns, row)` pair into a record
    ///
    /// The row must have exactly one value per column.
    pub fn from_row<S, I>(columns: &[S], values: I) -> Result<Self>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = JsonValue>,
    {
        let values: Vec<JsonValue> = values.into_iter().collect();
        if values.len() != columns.len() {
            return Err(Error::Other(format!(
                "Row has {} values but {} columns",
                values.len(),
                columns.len()
            )));
        }

        let fields = columns
            .iter()
            .map(|c| c.as_ref().to_string())
            .zip(values)
            .collect();
        Ok(Self(fields))
    }

    /// Convert a JSON value into a record; only objects are accepted
    pub fn from_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(obj) => Ok(Self(obj)),
            other => Err(Error::Other(format!(
                "Expected a JSON object for a record, got {other}"
            ))),
        }
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    /// Check whether a field is present
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Field names in order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over `(field, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying JSON object
    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }

    /// Convert into a JSON value
    pub fn into_value(self) -> JsonValue {
        JsonValue::Object(self.0)
    }

    /// Clone into a JSON value
    pub fn to_value(&self) -> JsonValue {
        JsonValue::Object(self.0.clone())
    }
}

impl From<JsonObject> for Record {
    fn from(obj: JsonObject) -> Self {
        Self(obj)
    }
}
