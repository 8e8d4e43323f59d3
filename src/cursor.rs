//! Cursor values and the checkpoint fold
//!
//! Incremental sync compares cursor values in two places: the source query
//! filter (`cursor > checkpoint`) and the fold that advances the stored
//! checkpoint. Both must agree on ordering, so cursor values are typed:
//! integers and decimals compare numerically, text compares
//! byte-lexicographically (the SQL binary collation), timestamps and dates
//! compare chronologically. Decimals and timestamps keep their full source
//! precision so a stored checkpoint never rounds below the last row read.

use crate::record::Record;
use crate::state::StreamState;
use crate::types::JsonValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Timestamp format used for persisted checkpoints and emitted records
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Timestamp format for values with sub-microsecond digits
pub const TIMESTAMP_NS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// Date format used for persisted checkpoints and emitted records
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Cursor Kind
// ============================================================================

/// Natural ordering domain of a cursor column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    /// Signed integers
    Integer,
    /// Floating point numbers
    Number,
    /// Exact decimals and integers wider than 64 bits
    Decimal,
    /// Strings, compared byte by byte
    Text,
    /// Naive timestamps, interpreted as UTC
    Timestamp,
    /// Timestamps with time zone
    TimestampTz,
    /// Calendar dates
    Date,
}

impl CursorKind {
    /// Map a SQL column type name to a cursor kind
    pub fn from_sql_type(data_type: &str) -> Self {
        let upper = data_type.trim().to_uppercase();
        if upper.contains("WITH TIME ZONE") || upper == "TIMESTAMPTZ" {
            return Self::TimestampTz;
        }
        if upper.starts_with("TIMESTAMP") || upper == "DATETIME" {
            return Self::Timestamp;
        }
        if upper == "DATE" {
            return Self::Date;
        }
        if upper.starts_with("DECIMAL")
            || upper.starts_with("NUMERIC")
            || matches!(upper.as_str(), "HUGEINT" | "UHUGEINT" | "UBIGINT")
        {
            return Self::Decimal;
        }
        if matches!(upper.as_str(), "DOUBLE" | "FLOAT" | "REAL" | "FLOAT4" | "FLOAT8") {
            return Self::Number;
        }
        if matches!(
            upper.as_str(),
            "TINYINT"
                | "SMALLINT"
                | "INTEGER"
                | "INT"
                | "BIGINT"
                | "UTINYINT"
                | "USMALLINT"
                | "UINTEGER"
                | "INT2"
                | "INT4"
                | "INT8"
        ) {
            return Self::Integer;
        }
        Self::Text
    }

    /// Infer a cursor kind from a record value
    ///
    /// Returns `None` for values that cannot act as a cursor (null,
    /// booleans, arrays, objects).
    pub fn infer(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => {
                if n.is_i64() {
                    Some(Self::Integer)
                } else {
                    Some(Self::Number)
                }
            }
            JsonValue::String(s) => {
                if parse_timestamp(s).is_some() {
                    Some(Self::Timestamp)
                } else if NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok() {
                    Some(Self::Date)
                } else {
                    Some(Self::Text)
                }
            }
            _ => None,
        }
    }

    /// Parse a JSON value as a cursor value of this kind
    pub fn parse(self, value: &JsonValue) -> Option<CursorValue> {
        match (self, value) {
            (_, JsonValue::Null) => None,

            (Self::Integer, JsonValue::Number(n)) => n.as_i64().map(CursorValue::Integer),
            (Self::Integer, JsonValue::String(s)) => {
                s.trim().parse::<i64>().ok().map(CursorValue::Integer)
            }

            (Self::Number, JsonValue::Number(n)) => {
                n.as_f64().filter(|f| f.is_finite()).map(CursorValue::Number)
            }
            (Self::Number, JsonValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(CursorValue::Number),

            (Self::Decimal, JsonValue::Number(n)) => parse_decimal(&n.to_string()),
            (Self::Decimal, JsonValue::String(s)) => parse_decimal(s),

            (Self::Text, JsonValue::String(s)) => Some(CursorValue::Text(s.clone())),
            (Self::Text, JsonValue::Number(n)) => Some(CursorValue::Text(n.to_string())),

            (Self::Timestamp | Self::TimestampTz, JsonValue::String(s)) => {
                parse_timestamp(s).map(CursorValue::Timestamp)
            }

            (Self::Date, JsonValue::String(s)) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .ok()
                .map(CursorValue::Date),

            _ => None,
        }
    }
}

/// Parse plain or scientific decimal notation without going through floats
fn parse_decimal(s: &str) -> Option<CursorValue> {
    let s = s.trim();
    s.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
        .map(CursorValue::Decimal)
}

/// Format a timestamp with microseconds, or nanoseconds when it has them
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    if ts.timestamp_subsec_nanos() % 1_000 == 0 {
        ts.format(TIMESTAMP_FORMAT).to_string()
    } else {
        ts.format(TIMESTAMP_NS_FORMAT).to_string()
    }
}

/// Parse RFC 3339 or naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` timestamps as UTC
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Cursor Value
// ============================================================================

/// A typed cursor value
#[derive(Debug, Clone, PartialEq)]
pub enum CursorValue {
    Integer(i64),
    Number(f64),
    Decimal(Decimal),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl CursorValue {
    /// Compare two values of the same kind; `None` when kinds differ
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Number(a), Self::Number(b)) => Some(a.total_cmp(b)),
            (Self::Decimal(a), Self::Decimal(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Serialize to the JSON form stored in state
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Integer(i) => JsonValue::from(*i),
            Self::Number(f) => serde_json::Number::from_f64(*f)
                .map_or(JsonValue::Null, JsonValue::Number),
            Self::Decimal(d) => JsonValue::String(d.to_string()),
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Timestamp(ts) => JsonValue::String(format_timestamp(ts)),
            Self::Date(d) => JsonValue::String(d.format(DATE_FORMAT).to_string()),
        }
    }
}

// ============================================================================
// Cursor Policy
// ============================================================================

/// Pure fold from `(state, record)` to the next checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPolicy {
    field: String,
    kind: Option<CursorKind>,
}

impl CursorPolicy {
    /// Create a policy for a cursor field, inferring the kind from values
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: None,
        }
    }

    /// Fix the cursor kind instead of inferring it
    #[must_use]
    pub fn with_kind(mut self, kind: CursorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// The cursor field
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The configured cursor kind, if fixed
    pub fn kind(&self) -> Option<CursorKind> {
        self.kind
    }

    /// Typed checkpoint stored in a stream state
    pub fn checkpoint(&self, state: &StreamState) -> Option<CursorValue> {
        let value = state.get(&self.field)?;
        let kind = self.kind.or_else(|| CursorKind::infer(value))?;
        kind.parse(value)
    }

    /// Compute the next state after observing a record
    ///
    /// The stored value only moves forward. Records with an absent, null or
    /// unparseable cursor value leave the state unchanged.
    pub fn next_state(&self, current: &StreamState, record: &Record) -> StreamState {
        let Some(raw) = record.get(&self.field).filter(|v| !v.is_null()) else {
            return current.clone();
        };

        let Some(kind) = self.kind.or_else(|| CursorKind::infer(raw)) else {
            tracing::warn!(
                "Ignoring non-scalar value for cursor field '{}': {raw}",
                self.field
            );
            return current.clone();
        };

        let Some(candidate) = kind.parse(raw) else {
            tracing::warn!(
                "Ignoring cursor value {raw} for '{}': not a valid {kind:?}",
                self.field
            );
            return current.clone();
        };

        let advance = match current.get(&self.field) {
            None | Some(JsonValue::Null) => true,
            Some(stored_raw) => match kind.parse(stored_raw) {
                Some(stored) => candidate.compare(&stored) == Some(Ordering::Greater),
                None => {
                    tracing::warn!(
                        "Stored checkpoint {stored_raw} for '{}' is not a valid {kind:?}; keeping it",
                        self.field
                    );
                    false
                }
            },
        };

        if advance {
            current.clone().with(self.field.clone(), candidate.to_json())
        } else {
            current.clone()
        }
    }

    /// Fold a sequence of records into a state, in order
    pub fn fold<'a>(
        &self,
        current: &StreamState,
        records: impl IntoIterator<Item = &'a Record>,
    ) -> StreamState {
        records
            .into_iter()
            .fold(current.clone(), |state, record| self.next_state(&state, record))
    }
}
