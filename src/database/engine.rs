//! DuckDB-based relational source
//!
//! Provides unified access to PostgreSQL, MySQL, SQLite and DuckDB files via
//! DuckDB extensions. Every operation opens its own in-memory DuckDB
//! connection and attaches the source database read-only as `source_db`;
//! reads own their connection until the record stream is dropped.

use crate::config::{ConnectionConfig, DatabaseEngine as DbType, SourceConfig, StreamOverride};
use crate::cursor::{CursorKind, CursorValue, CursorPolicy};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::source::{Catalog, CatalogStream, CheckResult, Source};
use crate::state::StreamState;
use crate::stream::{ColumnDescriptor, RecordStream, Stream, StreamDescriptor};
use crate::types::{JsonValue, SyncMode};
use async_trait::async_trait;
use duckdb::Connection;
use std::collections::VecDeque;
use std::sync::Arc;

/// Catalog alias of the attached source database
const SOURCE_ALIAS: &str = "source_db";

/// Schemas never exposed as streams
const SYSTEM_SCHEMAS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "mysql",
    "performance_schema",
    "sys",
];

// ============================================================================
// Attachment
// ============================================================================

/// How to reach the source database
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Database type
    db_type: DbType,
    /// Connection string used for ATTACH
    connection_string: String,
}

impl Attachment {
    /// Build an attachment from connection config
    pub fn new(db_type: DbType, connection: &ConnectionConfig) -> Result<Self> {
        let connection_string = build_connection_string(&db_type, connection)?;
        Ok(Self {
            db_type,
            connection_string,
        })
    }

    /// Open a fresh in-memory DuckDB connection with the source attached
    pub fn open(&self) -> Result<Connection> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::connection(format!("Failed to create DuckDB connection: {e}")))?;

        let escaped = self.connection_string.replace('\'', "''");
        let attach_sql = match self.db_type {
            DbType::Postgres => format!(
                "INSTALL postgres; LOAD postgres; \
                 ATTACH '{escaped}' AS {SOURCE_ALIAS} (TYPE POSTGRES, READ_ONLY);"
            ),
            DbType::Mysql => format!(
                "INSTALL mysql; LOAD mysql; \
                 ATTACH '{escaped}' AS {SOURCE_ALIAS} (TYPE MYSQL, READ_ONLY);"
            ),
            DbType::Sqlite => format!(
                "INSTALL sqlite; LOAD sqlite; \
                 ATTACH '{escaped}' AS {SOURCE_ALIAS} (TYPE SQLITE, READ_ONLY);"
            ),
            DbType::Duckdb => format!("ATTACH '{escaped}' AS {SOURCE_ALIAS} (READ_ONLY);"),
        };

        conn.execute_batch(&attach_sql).map_err(|e| {
            Error::connection(format!("Failed to attach {} database: {e}", self.db_type))
        })?;

        Ok(conn)
    }

    /// Database type
    pub fn db_type(&self) -> &DbType {
        &self.db_type
    }

    /// Get connection string (for logging - password masked)
    pub fn connection_info(&self) -> String {
        if let Some(at_pos) = self.connection_string.find('@') {
            if let Some(colon_pos) = self.connection_string[..at_pos].rfind(':') {
                // Skip the scheme separator in "postgresql://user@host"
                if !self.connection_string[colon_pos..].starts_with("://") {
                    let before_pass = &self.connection_string[..=colon_pos];
                    let after_at = &self.connection_string[at_pos..];
                    return format!("{before_pass}****{after_at}");
                }
            }
        }
        self.connection_string.clone()
    }
}

/// Build connection string from config
fn build_connection_string(db_type: &DbType, connection: &ConnectionConfig) -> Result<String> {
    // If connection_string is provided, use it directly
    if let Some(ref conn_str) = connection.connection_string {
        return Ok(conn_str.clone());
    }

    let database = connection.database.clone();

    match db_type {
        DbType::Sqlite | DbType::Duckdb => {
            // File-based engines use database as file path
            database.ok_or_else(|| Error::missing_field("source.connection.database"))
        }
        DbType::Postgres | DbType::Mysql => {
            let host = connection
                .host
                .clone()
                .unwrap_or_else(|| "localhost".to_string());
            let user = connection.user.clone().unwrap_or_else(|| match db_type {
                DbType::Mysql => "root".to_string(),
                _ => "postgres".to_string(),
            });
            let password = connection.resolve_password()?.unwrap_or_default();
            let port = connection.port.unwrap_or(match db_type {
                DbType::Mysql => 3306,
                _ => 5432,
            });

            if matches!(db_type, DbType::Postgres) {
                let database = database.unwrap_or_else(|| "postgres".to_string());
                let mut url = format!("postgresql://{user}:{password}@{host}:{port}/{database}");
                if let Some(ssl_mode) = &connection.ssl_mode {
                    url = format!("{url}?sslmode={ssl_mode}");
                }
                Ok(url)
            } else {
                let database = database.ok_or_else(|| {
                    Error::missing_field("source.connection.database")
                })?;
                Ok(format!("mysql://{user}:{password}@{host}:{port}/{database}"))
            }
        }
    }
}

// ============================================================================
// Source
// ============================================================================

/// A table in the attached database
#[derive(Debug, Clone, PartialEq, Eq)]
struct TableRef {
    schema: String,
    table: String,
}

impl TableRef {
    /// Fully qualified, quoted reference inside the attached catalog
    fn qualified(&self) -> String {
        format!(
            "{SOURCE_ALIAS}.{}.{}",
            quote_ident(&self.schema),
            quote_ident(&self.table)
        )
    }

    /// `schema.table`
    fn dotted(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Relational source backed by DuckDB
pub struct DuckDbSource {
    /// Source configuration
    config: SourceConfig,
    /// How to reach the database
    attachment: Arc<Attachment>,
}

impl DuckDbSource {
    /// Create a new source; fails only on invalid connection config
    pub fn new(config: SourceConfig) -> Result<Self> {
        let attachment = Attachment::new(config.engine, &config.connection)?;
        Ok(Self {
            config,
            attachment: Arc::new(attachment),
        })
    }

    /// Masked connection info for logs
    pub fn connection_info(&self) -> String {
        self.attachment.connection_info()
    }

    /// Stream name for a table
    ///
    /// Tables in the engine's default schema are named by table alone.
    fn stream_name(&self, table: &TableRef) -> String {
        let default_schema = match self.config.engine {
            DbType::Postgres => Some("public"),
            DbType::Sqlite | DbType::Duckdb => Some("main"),
            DbType::Mysql => self.config.connection.database.as_deref(),
        };
        if default_schema == Some(table.schema.as_str()) {
            table.table.clone()
        } else {
            table.dotted()
        }
    }

    /// Find the override that applies to a table, if any
    fn override_for(&self, name: &str, table: &TableRef) -> Option<&StreamOverride> {
        self.config.streams.iter().find(|o| match &o.table {
            Some(t) => t == &table.table || t == &table.dotted(),
            None => o.name == name,
        })
    }

    /// Whether the include list selects a table
    fn is_included(&self, name: &str, table: &TableRef) -> bool {
        self.config.tables.is_empty()
            || self
                .config
                .tables
                .iter()
                .any(|t| t == name || t == &table.table || t == &table.dotted())
    }

    /// Describe all selected tables, sorted by stream name
    fn describe(&self, conn: &Connection) -> Result<Vec<(StreamDescriptor, TableRef)>> {
        let mut described = Vec::new();

        for table in list_tables(conn)? {
            let default_name = self.stream_name(&table);
            let overrides = self.override_for(&default_name, &table);
            let name = overrides.map_or(default_name, |o| o.name.clone());

            if !self.is_included(&name, &table) {
                continue;
            }

            let columns = list_columns(conn, &table)?;
            let primary_key = match overrides.and_then(|o| o.primary_key.clone()) {
                Some(pk) => pk,
                None => list_primary_key(conn, &table),
            };

            let cursor_field = overrides
                .and_then(|o| o.cursor_field.clone())
                .or_else(|| {
                    self.config
                        .default_cursor_field
                        .clone()
                        .filter(|f| columns.iter().any(|c| &c.name == f))
                });

            let mut descriptor = StreamDescriptor::new(name)
                .with_primary_key(primary_key)
                .with_columns(columns);
            if let Some(field) = cursor_field {
                if let Some(column) = descriptor.column(&field) {
                    descriptor.cursor_kind = Some(CursorKind::from_sql_type(&column.data_type));
                }
                descriptor.cursor_field = Some(field);
            }

            described.push((descriptor, table));
        }

        described.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        Ok(described)
    }
}

#[async_trait]
impl Source for DuckDbSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn check_connection(&self) -> CheckResult {
        tracing::info!(
            "Checking connection to {} database at {}",
            self.attachment.db_type(),
            self.connection_info()
        );

        let conn = match self.attachment.open() {
            Ok(conn) => conn,
            Err(e) => return CheckResult::failure(e.to_string()),
        };

        match list_tables(&conn) {
            Ok(tables) => CheckResult::success_with(format!(
                "Connection successful. Found {} tables.",
                tables.len()
            )),
            Err(e) => CheckResult::failure(format!("Connection check failed: {e}")),
        }
    }

    async fn discover(&self) -> Result<Catalog> {
        let conn = self
            .attachment
            .open()
            .map_err(|e| Error::discovery(e.to_string()))?;
        let described = self
            .describe(&conn)
            .map_err(|e| Error::discovery(e.to_string()))?;

        Ok(Catalog {
            streams: described
                .iter()
                .map(|(d, _)| CatalogStream::from(d))
                .collect(),
        })
    }

    async fn list_streams(&self) -> Result<Vec<Box<dyn Stream>>> {
        let conn = self
            .attachment
            .open()
            .map_err(|e| Error::discovery(e.to_string()))?;
        let described = self
            .describe(&conn)
            .map_err(|e| Error::discovery(e.to_string()))?;

        Ok(described
            .into_iter()
            .map(|(descriptor, table)| {
                Box::new(DuckDbStream {
                    descriptor,
                    table,
                    attachment: Arc::clone(&self.attachment),
                    page_size: self.config.page_size,
                }) as Box<dyn Stream>
            })
            .collect())
    }
}

/// List tables and views of the attached catalog
fn list_tables(conn: &Connection) -> Result<Vec<TableRef>> {
    let excluded = SYSTEM_SCHEMAS
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let query = format!(
        "SELECT table_schema, table_name FROM information_schema.tables
         WHERE table_catalog = '{SOURCE_ALIAS}' AND table_schema NOT IN ({excluded})
         ORDER BY table_schema, table_name"
    );

    let mut stmt = conn
        .prepare(&query)
        .map_err(|e| Error::connection(format!("Failed to prepare query: {e}")))?;

    let tables = stmt
        .query_map([], |row| {
            Ok(TableRef {
                schema: row.get(0)?,
                table: row.get(1)?,
            })
        })
        .map_err(|e| Error::connection(format!("Failed to query tables: {e}")))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::connection(format!("Failed to read tables: {e}")))?;

    Ok(tables)
}

/// List columns of a table in ordinal order
fn list_columns(conn: &Connection, table: &TableRef) -> Result<Vec<ColumnDescriptor>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT column_name, data_type FROM information_schema.columns
             WHERE table_catalog = '{SOURCE_ALIAS}' AND table_schema = ? AND table_name = ?
             ORDER BY ordinal_position"
        ))
        .map_err(|e| Error::connection(format!("Failed to prepare query: {e}")))?;

    let columns = stmt
        .query_map(duckdb::params![table.schema, table.table], |row| {
            Ok(ColumnDescriptor::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })
        .map_err(|e| Error::connection(format!("Failed to query columns: {e}")))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::connection(format!("Failed to read columns: {e}")))?;

    Ok(columns)
}

/// Primary key columns, when the attached catalog exposes constraints
fn list_primary_key(conn: &Connection, table: &TableRef) -> Vec<String> {
    let query = format!(
        "SELECT unnest(constraint_column_names) FROM duckdb_constraints()
         WHERE database_name = '{SOURCE_ALIAS}' AND schema_name = ? AND table_name = ?
           AND constraint_type = 'PRIMARY KEY'"
    );

    let Ok(mut stmt) = conn.prepare(&query) else {
        return Vec::new();
    };
    let Ok(rows) = stmt.query_map(duckdb::params![table.schema, table.table], |row| {
        row.get::<_, String>(0)
    }) else {
        return Vec::new();
    };
    rows.filter_map(std::result::Result::ok).collect()
}

// ============================================================================
// Stream
// ============================================================================

/// One table of a [`DuckDbSource`]
pub struct DuckDbStream {
    descriptor: StreamDescriptor,
    table: TableRef,
    attachment: Arc<Attachment>,
    page_size: usize,
}

impl DuckDbStream {
    /// Plan a read: projection, checkpoint filter and ordering keys
    fn plan(&self, policy: Option<&CursorPolicy>, checkpoint: Option<&CursorValue>) -> ReadPlan {
        let columns = self
            .descriptor
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let filter = match (policy, checkpoint) {
            (Some(policy), Some(value)) => {
                let kind = policy.kind().unwrap_or(CursorKind::Text);
                Some(format!(
                    "{} > {}",
                    quote_ident(policy.field()),
                    cursor_literal(kind, value, self.column_type(policy.field()))
                ))
            }
            _ => None,
        };

        ReadPlan {
            select: format!("SELECT {columns} FROM {}", self.table.qualified()),
            filter,
            keys: self.order_keys(policy),
            unique: !self.descriptor.primary_key.is_empty(),
        }
    }

    /// Deterministic ordering: cursor first, then primary key, else every orderable column
    fn order_keys(&self, policy: Option<&CursorPolicy>) -> Vec<KeyColumn> {
        let mut names: Vec<String> = Vec::new();
        if let Some(policy) = policy {
            names.push(policy.field().to_string());
        }

        let tail: Vec<String> = if self.descriptor.primary_key.is_empty() {
            self.descriptor
                .columns
                .iter()
                .filter(|c| is_orderable(&c.data_type))
                .map(|c| c.name.clone())
                .collect()
        } else {
            self.descriptor.primary_key.clone()
        };
        for name in tail {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        names
            .into_iter()
            .map(|name| KeyColumn {
                ident: quote_ident(&name),
                data_type: self.column_type(&name).to_string(),
                name,
            })
            .collect()
    }

    fn column_type(&self, name: &str) -> &str {
        self.descriptor
            .column(name)
            .map_or("", |c| c.data_type.as_str())
    }

    /// Fail with a schema error when a required column is missing
    fn require_column(&self, field: &str) -> Result<()> {
        if self.descriptor.column(field).is_none() {
            return Err(Error::schema(
                &self.descriptor.name,
                format!("column '{field}' not found"),
            ));
        }
        Ok(())
    }

    /// Resolve mode and checkpoint into a read plan
    fn read_plan(
        &self,
        mode: SyncMode,
        cursor_field: Option<&str>,
        state: Option<&StreamState>,
    ) -> Result<ReadPlan> {
        if self.descriptor.columns.is_empty() {
            return Err(Error::schema(&self.descriptor.name, "table has no columns"));
        }

        let (policy, checkpoint) = match mode {
            SyncMode::FullRefresh => (self.descriptor.cursor_policy(None), None),
            SyncMode::Incremental => {
                let policy = self.descriptor.incremental_policy(cursor_field)?;
                let checkpoint = state.and_then(|s| policy.checkpoint(s));
                (Some(policy), checkpoint)
            }
        };
        if let Some(policy) = &policy {
            self.require_column(policy.field())?;
        }

        let plan = self.plan(policy.as_ref(), checkpoint.as_ref());
        tracing::debug!(
            "Executing query for {}: {}",
            self.descriptor.name,
            plan.page_sql(None, self.page_size.max(1))
        );
        Ok(plan)
    }

    fn page_reader(&self, conn: Connection, plan: ReadPlan) -> PageReader {
        PageReader {
            conn,
            stream: self.descriptor.name.clone(),
            plan,
            columns: self.descriptor.column_names(),
            page_size: self.page_size.max(1),
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

#[async_trait]
impl Stream for DuckDbStream {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    async fn read_records(
        &self,
        mode: SyncMode,
        cursor_field: Option<&str>,
        state: Option<&StreamState>,
    ) -> Result<RecordStream> {
        let plan = self.read_plan(mode, cursor_field, state)?;
        let reader = self.page_reader(self.attachment.open()?, plan);

        let records = futures::stream::unfold(reader, |mut reader| async move {
            reader.next_record().map(|item| (item, reader))
        });
        Ok(Box::pin(records))
    }
}

// ============================================================================
// Keyset paging
// ============================================================================

/// Column that orders a read and bounds the next page
#[derive(Debug, Clone)]
struct KeyColumn {
    name: String,
    ident: String,
    data_type: String,
}

/// Where the previous page ended
#[derive(Debug, Clone, PartialEq)]
struct PageKey {
    /// SQL literal per key column, `None` for NULL
    literals: Vec<Option<String>>,
    /// Rows already read whose key equals `literals`
    ties: usize,
}

/// Keyset-paginated SELECT for one read
///
/// Every page resumes after the last key read instead of at a row offset,
/// so a row updated between pages may be read again but never pushes an
/// unread row out of reach. Without a primary key the key may repeat; the
/// page then restarts at that key and skips the `ties` rows already read.
#[derive(Debug, Clone)]
struct ReadPlan {
    select: String,
    filter: Option<String>,
    keys: Vec<KeyColumn>,
    /// Keys identify a single row
    unique: bool,
}

impl ReadPlan {
    fn page_sql(&self, after: Option<&PageKey>, limit: usize) -> String {
        let mut conditions: Vec<String> = self.filter.iter().cloned().collect();
        if let Some(predicate) =
            after.and_then(|a| keyset_predicate(&self.keys, &a.literals, !self.unique))
        {
            conditions.push(predicate);
        }

        let mut sql = self.select.clone();
        if !conditions.is_empty() {
            sql = format!("{sql} WHERE {}", conditions.join(" AND "));
        }
        if !self.keys.is_empty() {
            let order = self
                .keys
                .iter()
                .map(|k| format!("{} ASC NULLS LAST", k.ident))
                .collect::<Vec<_>>()
                .join(", ");
            sql = format!("{sql} ORDER BY {order}");
        }

        match after {
            Some(after) if after.ties > 0 => format!("{sql} LIMIT {limit} OFFSET {}", after.ties),
            _ => format!("{sql} LIMIT {limit}"),
        }
    }

    /// Key literals of a record, in key order
    fn key_of(&self, record: &Record) -> Vec<Option<String>> {
        self.keys
            .iter()
            .map(|k| record.get(&k.name).and_then(|v| key_literal(v, &k.data_type)))
            .collect()
    }

    /// Position after `page`, continuing from `previous`
    fn next_key(&self, previous: Option<&PageKey>, page: &[Record]) -> Option<PageKey> {
        let literals = self.key_of(page.last()?);
        if self.unique {
            return Some(PageKey { literals, ties: 0 });
        }

        let same = page
            .iter()
            .rev()
            .take_while(|r| self.key_of(r) == literals)
            .count();
        let ties = match previous {
            Some(prev) if same == page.len() && prev.literals == literals => prev.ties + same,
            _ => same,
        };
        Some(PageKey { literals, ties })
    }
}

/// Rows ordered after `last` under `ORDER BY keys ASC NULLS LAST`
///
/// With `inclusive`, rows equal to `last` match as well.
fn keyset_predicate(
    keys: &[KeyColumn],
    last: &[Option<String>],
    inclusive: bool,
) -> Option<String> {
    if keys.is_empty() {
        return None;
    }

    let equal = |key: &KeyColumn, literal: &Option<String>| match literal {
        Some(value) => format!("{} = {value}", key.ident),
        None => format!("{} IS NULL", key.ident),
    };

    let mut branches = Vec::new();
    for (i, (key, literal)) in keys.iter().zip(last).enumerate() {
        // NULL sorts last: nothing follows it within this column
        let Some(value) = literal else { continue };
        let mut parts: Vec<String> = keys[..i]
            .iter()
            .zip(last)
            .map(|(k, l)| equal(k, l))
            .collect();
        parts.push(format!("({0} > {value} OR {0} IS NULL)", key.ident));
        branches.push(parts.join(" AND "));
    }
    if inclusive {
        branches.push(
            keys.iter()
                .zip(last)
                .map(|(k, l)| equal(k, l))
                .collect::<Vec<_>>()
                .join(" AND "),
        );
    }

    if branches.is_empty() {
        return Some("FALSE".to_string());
    }
    Some(format!(
        "({})",
        branches
            .iter()
            .map(|b| format!("({b})"))
            .collect::<Vec<_>>()
            .join(" OR ")
    ))
}

/// Nested types cannot be compared against a literal
fn is_orderable(data_type: &str) -> bool {
    let upper = data_type.trim().to_uppercase();
    !(upper.ends_with(']')
        || upper.starts_with("STRUCT")
        || upper.starts_with("MAP")
        || upper.starts_with("LIST")
        || upper.starts_with("UNION"))
}

fn is_blob(data_type: &str) -> bool {
    matches!(
        data_type.trim().to_uppercase().as_str(),
        "BLOB" | "BYTEA" | "BINARY" | "VARBINARY"
    )
}

/// Render a record value as a literal comparable with its column
fn key_literal(value: &JsonValue, data_type: &str) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::String(s) if is_blob(data_type) => Some(format!("from_base64('{s}')")),
        _ => {
            let kind = CursorKind::from_sql_type(data_type);
            if let Some(parsed) = kind.parse(value) {
                return Some(cursor_literal(kind, &parsed, data_type));
            }
            let text = value
                .as_str()
                .map_or_else(|| value.to_string(), str::to_string)
                .replace('\'', "''");
            if data_type.trim().is_empty() {
                Some(format!("'{text}'"))
            } else {
                Some(format!("CAST('{text}' AS {})", data_type.trim()))
            }
        }
    }
}

/// Pulls one page at a time and owns the read's connection
struct PageReader {
    conn: Connection,
    stream: String,
    plan: ReadPlan,
    columns: Vec<String>,
    page_size: usize,
    after: Option<PageKey>,
    buffer: VecDeque<Record>,
    exhausted: bool,
}

impl PageReader {
    fn next_record(&mut self) -> Option<Result<Record>> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }

    fn fetch_page(&mut self) -> Result<()> {
        let sql = self.plan.page_sql(self.after.as_ref(), self.page_size);
        let page = self.query_page(&sql)?;

        tracing::trace!("Fetched {} rows for {}", page.len(), self.stream);

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        self.after = self.plan.next_key(self.after.as_ref(), &page);
        self.buffer.extend(page);
        Ok(())
    }

    fn query_page(&self, sql: &str) -> Result<Vec<Record>> {
        let width = self.columns.len();
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| classify_read_error(&self.stream, &e))?;
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, duckdb::types::Value>(i))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .map_err(|e| classify_read_error(&self.stream, &e))?;

        let mut page = Vec::new();
        for row in rows {
            let values = row.map_err(|e| classify_read_error(&self.stream, &e))?;
            page.push(Record::from_row(
                &self.columns,
                values.into_iter().map(duckdb_value_to_json),
            )?);
        }
        Ok(page)
    }
}

/// Binder and catalog failures mean the table no longer matches discovery
fn classify_read_error(stream: &str, e: &duckdb::Error) -> Error {
    let message = e.to_string();
    if message.contains("Binder Error") || message.contains("Catalog Error") {
        Error::schema(stream, message)
    } else {
        Error::connection(format!("Read failed for stream '{stream}': {message}"))
    }
}

// ============================================================================
// SQL helpers
// ============================================================================

/// Quote an identifier
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a checkpoint as a typed SQL literal
///
/// The literal is cast to the column's own type (`data_type`) so the
/// database compares at full precision and in the same order as
/// [`CursorValue::compare`].
fn cursor_literal(kind: CursorKind, value: &CursorValue, data_type: &str) -> String {
    let data_type = data_type.trim();
    let upper = data_type.to_uppercase();
    match value {
        CursorValue::Integer(i) => i.to_string(),
        CursorValue::Number(f) => format!("CAST({f} AS DOUBLE)"),
        CursorValue::Decimal(d) => {
            if data_type.is_empty() {
                format!("CAST('{d}' AS DECIMAL(38,{}))", d.scale())
            } else {
                format!("CAST('{d}' AS {data_type})")
            }
        }
        CursorValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        CursorValue::Timestamp(ts) => {
            let fraction = if upper.ends_with("_NS") { "%.9f" } else { "%.6f" };
            let fmt = format!("%Y-%m-%d %H:%M:%S{fraction}");
            let naive = ts.format(&fmt);
            let tz = kind == CursorKind::TimestampTz;
            let target = if upper.starts_with("TIMESTAMP") {
                data_type
            } else if tz {
                "TIMESTAMPTZ"
            } else {
                "TIMESTAMP"
            };
            if tz {
                format!("CAST('{naive}+00' AS {target})")
            } else {
                format!("CAST('{naive}' AS {target})")
            }
        }
        CursorValue::Date(d) => format!("CAST('{}' AS DATE)", d.format("%Y-%m-%d")),
    }
}

/// Convert a timestamp in `unit` to UTC, keeping nanoseconds
fn timestamp_from_unit(
    unit: duckdb::types::TimeUnit,
    value: i64,
) -> Option<chrono::DateTime<chrono::Utc>> {
    match unit {
        duckdb::types::TimeUnit::Nanosecond => chrono::DateTime::from_timestamp(
            value.div_euclid(1_000_000_000),
            value.rem_euclid(1_000_000_000) as u32,
        ),
        _ => chrono::DateTime::from_timestamp_micros(to_micros(unit, value)),
    }
}

/// Convert a timestamp in `unit` to microseconds
fn to_micros(unit: duckdb::types::TimeUnit, value: i64) -> i64 {
    use duckdb::types::TimeUnit;
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value.div_euclid(1_000),
    }
}

/// Convert DuckDB Value to JSON Value
fn duckdb_value_to_json(value: duckdb::types::Value) -> JsonValue {
    use duckdb::types::Value;
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => JsonValue::Number(i.into()),
        Value::SmallInt(i) => JsonValue::Number(i.into()),
        Value::Int(i) => JsonValue::Number(i.into()),
        Value::BigInt(i) => JsonValue::Number(i.into()),
        Value::HugeInt(i) => JsonValue::String(i.to_string()),
        Value::UTinyInt(i) => JsonValue::Number(i.into()),
        Value::USmallInt(i) => JsonValue::Number(i.into()),
        Value::UInt(i) => JsonValue::Number(i.into()),
        Value::UBigInt(i) => JsonValue::Number(i.into()),
        Value::Float(f) => {
            serde_json::Number::from_f64(f64::from(f)).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::Double(f) => {
            serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::Decimal(d) => JsonValue::String(d.to_string()),
        Value::Text(s) | Value::Enum(s) => JsonValue::String(s),
        Value::Blob(b) => JsonValue::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b,
        )),
        Value::Timestamp(unit, i) => timestamp_from_unit(unit, i)
            .map(|dt| JsonValue::String(crate::cursor::format_timestamp(&dt)))
            .unwrap_or(JsonValue::Number(i.into())),
        Value::Date32(d) => {
            // Days since epoch (719163 is the number of days from 1 CE to 1970-01-01)
            chrono::NaiveDate::from_num_days_from_ce_opt(d + 719_163)
                .map(|date| JsonValue::String(date.format(crate::cursor::DATE_FORMAT).to_string()))
                .unwrap_or(JsonValue::Number(d.into()))
        }
        Value::Time64(unit, t) => {
            let nanos = match unit {
                duckdb::types::TimeUnit::Nanosecond => t,
                _ => to_micros(unit, t).saturating_mul(1_000),
            };
            let secs = nanos / 1_000_000_000;
            let fraction = nanos % 1_000_000_000;
            let clock = format!(
                "{:02}:{:02}:{:02}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            );
            if fraction % 1_000 == 0 {
                JsonValue::String(format!("{clock}.{:06}", fraction / 1_000))
            } else {
                JsonValue::String(format!("{clock}.{fraction:09}"))
            }
        }
        Value::List(items) | Value::Array(items) => {
            JsonValue::Array(items.into_iter().map(duckdb_value_to_json).collect())
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}
