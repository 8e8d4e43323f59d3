//! Stream abstraction
//!
//! A stream is one logical table that can be synchronized on its own. It
//! produces records lazily under a [`SyncMode`] and proposes checkpoint
//! updates through a pure function; it never touches shared state.

use crate::cursor::{CursorKind, CursorPolicy};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::state::StreamState;
use crate::types::SyncMode;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Lazy, finite sequence of records produced by one read
///
/// Dropping the stream before it is exhausted releases whatever resources
/// the read holds.
pub type RecordStream = BoxStream<'static, Result<Record>>;

// ============================================================================
// Stream Descriptor
// ============================================================================

/// Column of a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,
    /// Source type name (e.g. `BIGINT`, `TIMESTAMP`)
    pub data_type: String,
}

impl ColumnDescriptor {
    /// Create a column descriptor
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Static description of a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Stream name, unique within a source
    pub name: String,
    /// Primary key columns (possibly empty)
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Cursor field for incremental sync
    #[serde(default)]
    pub cursor_field: Option<String>,
    /// Ordering domain of the cursor field, when known
    #[serde(default)]
    pub cursor_kind: Option<CursorKind>,
    /// Columns, in source order
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

impl StreamDescriptor {
    /// Create a descriptor with no key, cursor or columns
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: Vec::new(),
            cursor_field: None,
            cursor_kind: None,
            columns: Vec::new(),
        }
    }

    /// Set the primary key
    #[must_use]
    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the cursor field
    #[must_use]
    pub fn with_cursor_field(mut self, field: impl Into<String>) -> Self {
        self.cursor_field = Some(field.into());
        self
    }

    /// Set the cursor kind
    #[must_use]
    pub fn with_cursor_kind(mut self, kind: CursorKind) -> Self {
        self.cursor_kind = Some(kind);
        self
    }

    /// Set the columns
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.columns = columns;
        self
    }

    /// Whether the stream can be read incrementally
    pub fn supports_incremental(&self) -> bool {
        self.cursor_field.is_some()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Cursor policy for a cursor field (the descriptor's unless overridden)
    ///
    /// The kind is taken from the column type when the field is a known
    /// column, else from the descriptor when the field is its own cursor.
    pub fn cursor_policy(&self, cursor_field: Option<&str>) -> Option<CursorPolicy> {
        let field = cursor_field.or(self.cursor_field.as_deref())?;
        let kind = self
            .column(field)
            .map(|c| CursorKind::from_sql_type(&c.data_type))
            .or_else(|| {
                (self.cursor_field.as_deref() == Some(field))
                    .then_some(self.cursor_kind)
                    .flatten()
            });

        let policy = CursorPolicy::new(field);
        Some(match kind {
            Some(kind) => policy.with_kind(kind),
            None => policy,
        })
    }

    /// Resolve the cursor policy for an incremental read
    ///
    /// Fails with a state error when no cursor field is configured.
    pub fn incremental_policy(&self, cursor_field: Option<&str>) -> Result<CursorPolicy> {
        self.cursor_policy(cursor_field).ok_or_else(|| {
            Error::state(format!(
                "Stream '{}' has no cursor field configured; incremental sync is not supported",
                self.name
            ))
        })
    }
}

// ============================================================================
// Stream Trait
// ============================================================================

/// A named, independently synchronizable unit of a source
#[async_trait]
pub trait Stream: Send + Sync {
    /// Static description of this stream
    fn descriptor(&self) -> &StreamDescriptor;

    /// Stream name
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Start a fresh read
    ///
    /// - `FullRefresh` yields every row and ignores `cursor_field` and `state`
    /// - `Incremental` yields rows whose cursor value is strictly greater
    ///   than the checkpoint in `state`, in ascending cursor order; with no
    ///   checkpoint it yields every row
    async fn read_records(
        &self,
        mode: SyncMode,
        cursor_field: Option<&str>,
        state: Option<&StreamState>,
    ) -> Result<RecordStream>;

    /// Propose the next checkpoint after a record was forwarded
    fn updated_state(
        &self,
        cursor_field: Option<&str>,
        current: &StreamState,
        record: &Record,
    ) -> StreamState {
        match self.descriptor().cursor_policy(cursor_field) {
            Some(policy) => policy.next_state(current, record),
            None => current.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders() -> StreamDescriptor {
        StreamDescriptor::new("orders")
            .with_primary_key(["id"])
            .with_cursor_field("updated_at")
            .with_columns(vec![
                ColumnDescriptor::new("id", "BIGINT"),
                ColumnDescriptor::new("updated_at", "TIMESTAMP"),
                ColumnDescriptor::new("version", "INTEGER"),
            ])
    }

    #[test]
    fn test_supports_incremental() {
        assert!(orders().supports_incremental());
        assert!(!StreamDescriptor::new("customers").supports_incremental());
    }

    #[test]
    fn test_cursor_policy_uses_column_type() {
        let policy = orders().cursor_policy(None).unwrap();
        assert_eq!(policy.field(), "updated_at");
        assert_eq!(policy.kind(), Some(CursorKind::Timestamp));

        let policy = orders().cursor_policy(Some("version")).unwrap();
        assert_eq!(policy.field(), "version");
        assert_eq!(policy.kind(), Some(CursorKind::Integer));
    }

    #[test]
    fn test_cursor_policy_without_columns() {
        let descriptor = StreamDescriptor::new("events")
            .with_cursor_field("seq")
            .with_cursor_kind(CursorKind::Integer);
        assert_eq!(
            descriptor.cursor_policy(None).unwrap().kind(),
            Some(CursorKind::Integer)
        );

        let other = descriptor.cursor_policy(Some("ts")).unwrap();
        assert_eq!(other.kind(), None);
    }

    #[test]
    fn test_incremental_policy_requires_cursor() {
        let err = StreamDescriptor::new("customers")
            .incremental_policy(None)
            .unwrap_err();
        assert!(matches!(err, Error::State { .. }));
        assert!(err.to_string().contains("customers"));
    }

    #[test]
    fn test_descriptor_serde() {
        let value = serde_json::to_value(orders()).unwrap();
        assert_eq!(value["cursor_field"], json!("updated_at"));
        let restored: StreamDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(restored, orders());
    }
}
