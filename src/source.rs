//! Source trait and catalog types
//!
//! A source owns connectivity to one system and exposes its tables as
//! [`Stream`]s. Configuration is supplied when the source is constructed.

use crate::cursor::CursorKind;
use crate::error::Result;
use crate::stream::{Stream, StreamDescriptor};
use crate::types::SyncMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ============================================================================
// Check Result
// ============================================================================

/// Result of a connection check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the check succeeded
    pub success: bool,

    /// Diagnostic message
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a successful check result
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Create a successful check result with a note
    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    /// Create a failed check result
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Catalog Types
// ============================================================================

/// Discovered catalog (available streams)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Available streams
    pub streams: Vec<CatalogStream>,
}

impl Catalog {
    /// Find a stream by name
    pub fn get(&self, name: &str) -> Option<&CatalogStream> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Stream names in catalog order
    pub fn stream_names(&self) -> Vec<&str> {
        self.streams.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Stream in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStream {
    /// Stream name
    pub name: String,

    /// JSON schema for the stream
    #[serde(default)]
    pub json_schema: Value,

    /// Supported sync modes
    #[serde(default)]
    pub supported_sync_modes: Vec<SyncMode>,

    /// Default cursor field
    #[serde(default)]
    pub default_cursor_field: Option<String>,

    /// Source-defined primary key
    #[serde(default)]
    pub primary_key: Vec<String>,
}

impl From<&StreamDescriptor> for CatalogStream {
    fn from(descriptor: &StreamDescriptor) -> Self {
        let properties: serde_json::Map<String, Value> = descriptor
            .columns
            .iter()
            .map(|c| (c.name.clone(), json_schema_type(&c.data_type)))
            .collect();

        Self {
            name: descriptor.name.clone(),
            json_schema: json!({
                "type": "object",
                "properties": properties,
            }),
            supported_sync_modes: if descriptor.supports_incremental() {
                vec![SyncMode::FullRefresh, SyncMode::Incremental]
            } else {
                vec![SyncMode::FullRefresh]
            },
            default_cursor_field: descriptor.cursor_field.clone(),
            primary_key: descriptor.primary_key.clone(),
        }
    }
}

/// Map a SQL type name to a nullable JSON schema type
fn json_schema_type(data_type: &str) -> Value {
    let upper = data_type.trim().to_uppercase();
    let (ty, format) = match CursorKind::from_sql_type(&upper) {
        CursorKind::Integer => ("integer", None),
        CursorKind::Number | CursorKind::Decimal => ("number", None),
        CursorKind::Timestamp | CursorKind::TimestampTz => ("string", Some("date-time")),
        CursorKind::Date => ("string", Some("date")),
        CursorKind::Text => {
            if upper == "BOOLEAN" || upper == "BOOL" {
                ("boolean", None)
            } else if upper.ends_with("[]") || upper.starts_with("LIST") {
                ("array", None)
            } else if upper.starts_with("STRUCT") || upper.starts_with("MAP") || upper == "JSON" {
                ("object", None)
            } else {
                ("string", None)
            }
        }
    };

    let mut schema = json!({ "type": [ty, "null"] });
    if let Some(format) = format {
        schema["format"] = json!(format);
    }
    schema
}

// ============================================================================
// Source Trait
// ============================================================================

/// A named collection of streams plus connectivity checks and discovery
#[async_trait]
pub trait Source: Send + Sync {
    /// Source name (for logs and summaries)
    fn name(&self) -> &str;

    /// Test connectivity
    ///
    /// Never fails: every problem is reported as a failed [`CheckResult`].
    async fn check_connection(&self) -> CheckResult;

    /// Describe the currently available streams without reading rows
    async fn discover(&self) -> Result<Catalog>;

    /// Instantiate the streams, ordered by name
    async fn list_streams(&self) -> Result<Vec<Box<dyn Stream>>>;
}
