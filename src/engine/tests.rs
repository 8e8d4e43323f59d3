//! Tests for the sync orchestrator

use super::*;
use crate::cursor::CursorKind;
use crate::source::{Catalog, CatalogStream, CheckResult};
use crate::stream::{ColumnDescriptor, RecordStream, StreamDescriptor};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

// ============================================================================
// In-memory fakes
// ============================================================================

#[derive(Clone)]
struct MemoryStream {
    descriptor: StreamDescriptor,
    rows: Vec<Record>,
    /// Fail with a connection error after this many rows
    fail_after: Option<usize>,
}

impl MemoryStream {
    fn new(descriptor: StreamDescriptor, rows: Vec<serde_json::Value>) -> Self {
        Self {
            descriptor,
            rows: rows
                .into_iter()
                .map(|v| Record::from_value(v).unwrap())
                .collect(),
            fail_after: None,
        }
    }

    fn failing_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

#[async_trait]
impl Stream for MemoryStream {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    async fn read_records(
        &self,
        mode: SyncMode,
        cursor_field: Option<&str>,
        state: Option<&StreamState>,
    ) -> Result<RecordStream> {
        let mut rows = self.rows.clone();

        if mode == SyncMode::Incremental {
            let policy = self.descriptor.incremental_policy(cursor_field)?;
            if let Some(checkpoint) = state.and_then(|s| policy.checkpoint(s)) {
                let kind = policy.kind().unwrap_or(CursorKind::Text);
                rows.retain(|r| {
                    r.get(policy.field())
                        .and_then(|v| kind.parse(v))
                        .is_some_and(|v| v.compare(&checkpoint) == Some(Ordering::Greater))
                });
            }
        }

        let mut items: Vec<Result<Record>> = rows.into_iter().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(Error::connection("connection reset by peer")));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

struct MemorySource {
    healthy: bool,
    discoverable: bool,
    streams: Vec<MemoryStream>,
}

impl MemorySource {
    fn new(streams: Vec<MemoryStream>) -> Self {
        Self {
            healthy: true,
            discoverable: true,
            streams,
        }
    }
}

#[async_trait]
impl Source for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check_connection(&self) -> CheckResult {
        if self.healthy {
            CheckResult::success()
        } else {
            CheckResult::failure("connection refused")
        }
    }

    async fn discover(&self) -> Result<Catalog> {
        if !self.discoverable {
            return Err(Error::discovery("permission denied on information_schema"));
        }
        Ok(Catalog {
            streams: self
                .streams
                .iter()
                .map(|s| CatalogStream::from(&s.descriptor))
                .collect(),
        })
    }

    async fn list_streams(&self) -> Result<Vec<Box<dyn Stream>>> {
        let mut streams = self.streams.clone();
        streams.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        Ok(streams
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn Stream>)
            .collect())
    }
}

type Written = Arc<Mutex<Vec<(String, Vec<Record>)>>>;

struct RecordingSink {
    name: String,
    written: Written,
    fail: bool,
}

impl RecordingSink {
    fn new(name: &str) -> (Self, Written) {
        let written = Written::default();
        let sink = Self {
            name: name.to_string(),
            written: Arc::clone(&written),
            fail: false,
        };
        (sink, written)
    }

    fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            written: Written::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl SinkWriter for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, stream: &crate::stream::StreamDescriptor, batch: &[Record]) -> Result<()> {
        if self.fail {
            return Err(Error::output("disk full"));
        }
        self.written
            .lock()
            .unwrap()
            .push((stream.name.clone(), batch.to_vec()));
        Ok(())
    }
}

fn records_for(written: &Written, stream: &str) -> Vec<serde_json::Value> {
    written
        .lock()
        .unwrap()
        .iter()
        .filter(|(s, _)| s == stream)
        .flat_map(|(_, batch)| batch.iter().map(Record::to_value))
        .collect()
}

fn orders() -> MemoryStream {
    MemoryStream::new(
        StreamDescriptor::new("orders")
            .with_primary_key(["id"])
            .with_cursor_field("updated_at")
            .with_columns(vec![
                ColumnDescriptor::new("id", "BIGINT"),
                ColumnDescriptor::new("updated_at", "DATE"),
            ]),
        vec![
            json!({"id": 1, "updated_at": "2024-01-01"}),
            json!({"id": 2, "updated_at": "2024-01-02"}),
            json!({"id": 3, "updated_at": "2024-01-05"}),
        ],
    )
}

fn customers() -> MemoryStream {
    MemoryStream::new(
        StreamDescriptor::new("customers")
            .with_primary_key(["id"])
            .with_columns(vec![
                ColumnDescriptor::new("id", "BIGINT"),
                ColumnDescriptor::new("name", "VARCHAR"),
            ]),
        vec![
            json!({"id": 3, "name": "Carol"}),
            json!({"id": 1, "name": "Alice"}),
            json!({"id": 2, "name": "Bob"}),
        ],
    )
}

fn orchestrator(
    source: MemorySource,
    sinks: Vec<Box<dyn SinkWriter>>,
    state: StateManager,
    config: SyncConfig,
) -> SyncOrchestrator {
    SyncOrchestrator::new(Box::new(source), sinks, state, config).unwrap()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_new_rejects_invalid_config() {
    let (sink, _) = RecordingSink::new("a");
    let result = SyncOrchestrator::new(
        Box::new(MemorySource::new(vec![])),
        vec![Box::new(sink)],
        StateManager::in_memory(),
        SyncConfig::new().with_batch_size(0),
    );
    assert!(matches!(result, Err(Error::InvalidConfigValue { .. })));

    let result = SyncOrchestrator::new(
        Box::new(MemorySource::new(vec![])),
        vec![],
        StateManager::in_memory(),
        SyncConfig::new(),
    );
    assert!(matches!(result, Err(Error::Config { .. })));

    let (a, _) = RecordingSink::new("dup");
    let (b, _) = RecordingSink::new("dup");
    let result = SyncOrchestrator::new(
        Box::new(MemorySource::new(vec![])),
        vec![Box::new(a), Box::new(b)],
        StateManager::in_memory(),
        SyncConfig::new(),
    );
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[test]
fn test_mode_resolution() {
    let config = SyncConfig::new();
    assert_eq!(config.mode_for(&orders().descriptor), SyncMode::Incremental);
    assert_eq!(config.mode_for(&customers().descriptor), SyncMode::FullRefresh);

    let config = SyncConfig::new()
        .with_default_mode(SyncMode::FullRefresh)
        .with_stream_mode("customers", SyncMode::Incremental);
    assert_eq!(config.mode_for(&orders().descriptor), SyncMode::FullRefresh);
    assert_eq!(config.mode_for(&customers().descriptor), SyncMode::Incremental);
}

// ============================================================================
// Run behavior
// ============================================================================

#[tokio::test]
async fn test_full_refresh_preserves_order() {
    let (sink, written) = RecordingSink::new("mem");
    let mut sync = orchestrator(
        MemorySource::new(vec![customers()]),
        vec![Box::new(sink)],
        StateManager::in_memory(),
        SyncConfig::new().with_batch_size(2),
    );

    let report = sync.run().await.unwrap();

    assert_eq!(report.status, SyncStatus::Succeeded);
    assert_eq!(*sync.phase(), SyncPhase::Done);
    assert_eq!(
        records_for(&written, "customers"),
        vec![
            json!({"id": 3, "name": "Carol"}),
            json!({"id": 1, "name": "Alice"}),
            json!({"id": 2, "name": "Bob"}),
        ]
    );
    // Two batches: 2 + 1
    assert_eq!(written.lock().unwrap().len(), 2);
    assert_eq!(report.stream("customers").unwrap().records_written["mem"], 3);
}

#[tokio::test]
async fn test_orders_and_customers_scenario() {
    let (sink, written) = RecordingSink::new("mem");
    let state = StateManager::from_json(r#"{"orders": {"updated_at": "2024-01-01"}}"#).unwrap();
    let mut sync = orchestrator(
        MemorySource::new(vec![orders(), customers()]),
        vec![Box::new(sink)],
        state.clone(),
        SyncConfig::new().with_default_mode(SyncMode::Incremental),
    );

    let report = sync.run().await.unwrap();

    assert_eq!(
        records_for(&written, "orders"),
        vec![
            json!({"id": 2, "updated_at": "2024-01-02"}),
            json!({"id": 3, "updated_at": "2024-01-05"}),
        ]
    );
    assert_eq!(
        state.stream_state("orders").await.get("updated_at"),
        Some(&json!("2024-01-05"))
    );

    assert_eq!(report.status, SyncStatus::Partial);
    assert!(report.has_failures());
    assert_eq!(report.failed_streams(), vec!["customers"]);

    let customers = report.stream("customers").unwrap();
    match &customers.status {
        StreamStatus::Failed { reason } => assert!(reason.contains("no cursor field")),
        StreamStatus::Succeeded => panic!("customers should fail"),
    }
    assert!(records_for(&written, "customers").is_empty());
    assert!(report.stream("orders").unwrap().is_success());
}

#[tokio::test]
async fn test_incremental_is_idempotent() {
    let state = StateManager::in_memory();

    let (sink, _) = RecordingSink::new("mem");
    let mut first = orchestrator(
        MemorySource::new(vec![orders()]),
        vec![Box::new(sink)],
        state.clone(),
        SyncConfig::new(),
    );
    let report = first.run().await.unwrap();
    assert_eq!(report.total_records, 3);
    let after_first = state.snapshot().await;

    let (sink, written) = RecordingSink::new("mem");
    let mut second = orchestrator(
        MemorySource::new(vec![orders()]),
        vec![Box::new(sink)],
        state.clone(),
        SyncConfig::new(),
    );
    let report = second.run().await.unwrap();

    assert_eq!(report.total_records, 0);
    assert!(written.lock().unwrap().is_empty());
    assert_eq!(state.snapshot().await, after_first);
}

#[tokio::test]
async fn test_bootstrap_matches_full_refresh() {
    let (full_sink, full_written) = RecordingSink::new("mem");
    let mut full = orchestrator(
        MemorySource::new(vec![orders()]),
        vec![Box::new(full_sink)],
        StateManager::in_memory(),
        SyncConfig::new().with_default_mode(SyncMode::FullRefresh),
    );
    full.run().await.unwrap();

    let (inc_sink, inc_written) = RecordingSink::new("mem");
    let mut incremental = orchestrator(
        MemorySource::new(vec![orders()]),
        vec![Box::new(inc_sink)],
        StateManager::in_memory(),
        SyncConfig::new().with_default_mode(SyncMode::Incremental),
    );
    incremental.run().await.unwrap();

    assert_eq!(
        records_for(&full_written, "orders"),
        records_for(&inc_written, "orders")
    );
}

#[tokio::test]
async fn test_mid_stream_error_is_isolated() {
    let failing = MemoryStream::new(
        StreamDescriptor::new("events")
            .with_cursor_field("seq")
            .with_columns(vec![ColumnDescriptor::new("seq", "BIGINT")]),
        vec![json!({"seq": 1}), json!({"seq": 2}), json!({"seq": 3})],
    )
    .failing_after(2);

    let state = StateManager::from_json(r#"{"events": {"seq": 0}}"#).unwrap();
    let (sink, _) = RecordingSink::new("mem");
    let mut sync = orchestrator(
        MemorySource::new(vec![failing, orders()]),
        vec![Box::new(sink)],
        state.clone(),
        SyncConfig::new().with_batch_size(1),
    );

    let report = sync.run().await.unwrap();

    assert_eq!(report.status, SyncStatus::Partial);
    let events = report.stream("events").unwrap();
    assert!(!events.is_success());
    assert_eq!(events.records_read, 2);
    // Committed state untouched despite delivered batches
    assert_eq!(state.stream_state("events").await.get("seq"), Some(&json!(0)));
    assert_eq!(events.state.get("seq"), Some(&json!(0)));

    assert_eq!(
        state.stream_state("orders").await.get("updated_at"),
        Some(&json!("2024-01-05"))
    );
}

#[tokio::test]
async fn test_checkpoint_every_batch_keeps_partial_progress() {
    let failing = MemoryStream::new(
        StreamDescriptor::new("events")
            .with_cursor_field("seq")
            .with_columns(vec![ColumnDescriptor::new("seq", "BIGINT")]),
        vec![json!({"seq": 1}), json!({"seq": 2}), json!({"seq": 3})],
    )
    .failing_after(2);

    let state = StateManager::in_memory();
    let (sink, _) = RecordingSink::new("mem");
    let mut sync = orchestrator(
        MemorySource::new(vec![failing]),
        vec![Box::new(sink)],
        state.clone(),
        SyncConfig::new()
            .with_batch_size(1)
            .with_checkpoint_every_batch(true),
    );

    let report = sync.run().await.unwrap();

    assert_eq!(report.status, SyncStatus::Failed);
    assert_eq!(state.stream_state("events").await.get("seq"), Some(&json!(2)));
}

#[tokio::test]
async fn test_failed_sink_is_excluded_and_state_not_committed() {
    let (good, written) = RecordingSink::new("good");
    let bad = RecordingSink::failing("bad");
    let state = StateManager::in_memory();

    let mut sync = orchestrator(
        MemorySource::new(vec![orders()]),
        vec![Box::new(good), Box::new(bad)],
        state.clone(),
        SyncConfig::new().with_batch_size(1),
    );

    let report = sync.run().await.unwrap();
    let orders = report.stream("orders").unwrap();

    assert!(!orders.is_success());
    assert_eq!(orders.records_written["good"], 3);
    assert_eq!(orders.records_written["bad"], 0);
    assert!(orders.sink_errors["bad"].contains("disk full"));
    assert_eq!(records_for(&written, "orders").len(), 3);
    assert!(state.stream_state("orders").await.is_empty());
}

#[tokio::test]
async fn test_read_abandoned_when_all_sinks_fail() {
    let mut sync = orchestrator(
        MemorySource::new(vec![orders()]),
        vec![Box::new(RecordingSink::failing("bad"))],
        StateManager::in_memory(),
        SyncConfig::new().with_batch_size(1),
    );

    let report = sync.run().await.unwrap();
    let orders = report.stream("orders").unwrap();

    assert_eq!(report.status, SyncStatus::Failed);
    assert_eq!(orders.records_read, 1);
    assert_eq!(orders.sink_errors.len(), 1);
}

#[tokio::test]
async fn test_unknown_stream_is_reported() {
    let (sink, _) = RecordingSink::new("mem");
    let mut sync = orchestrator(
        MemorySource::new(vec![orders(), customers()]),
        vec![Box::new(sink)],
        StateManager::in_memory(),
        SyncConfig::new().with_streams(["orders", "ghost"]),
    );

    let report = sync.run().await.unwrap();

    let names: Vec<&str> = report.streams.iter().map(|s| s.stream.as_str()).collect();
    assert_eq!(names, vec!["ghost", "orders"]);
    let ghost = report.stream("ghost").unwrap();
    assert_eq!(ghost.mode, None);
    assert_eq!(
        ghost.status,
        StreamStatus::Failed {
            reason: "Stream 'ghost' not found in catalog".to_string()
        }
    );
    assert_eq!(report.status, SyncStatus::Partial);
}

#[tokio::test]
async fn test_failed_check_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut source = MemorySource::new(vec![orders()]);
    source.healthy = false;
    let (sink, written) = RecordingSink::new("mem");
    let mut sync = orchestrator(
        source,
        vec![Box::new(sink)],
        StateManager::new(&path),
        SyncConfig::new(),
    );

    let err = sync.run().await.unwrap_err();

    assert!(matches!(err, Error::ConnectionCheck { .. }));
    assert!(err.is_fatal());
    assert_eq!(*sync.phase(), SyncPhase::Failed);
    assert!(written.lock().unwrap().is_empty());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_discovery_failure_is_fatal() {
    let mut source = MemorySource::new(vec![orders()]);
    source.discoverable = false;
    let (sink, _) = RecordingSink::new("mem");
    let mut sync = orchestrator(
        source,
        vec![Box::new(sink)],
        StateManager::in_memory(),
        SyncConfig::new(),
    );

    let err = sync.run().await.unwrap_err();
    assert!(matches!(err, Error::Discovery { .. }));
    assert_eq!(*sync.phase(), SyncPhase::Failed);
}

#[tokio::test]
async fn test_state_file_written_with_flat_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let (sink, _) = RecordingSink::new("mem");
    let mut sync = orchestrator(
        MemorySource::new(vec![orders(), customers()]),
        vec![Box::new(sink)],
        StateManager::new(&path),
        SyncConfig::new(),
    );
    let report = sync.run().await.unwrap();
    assert_eq!(report.status, SyncStatus::Succeeded);

    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        persisted,
        json!({
            "customers": {},
            "orders": {"updated_at": "2024-01-05"}
        })
    );
}

#[test]
fn test_report_serialization() {
    let mut failed = StreamReport::new("customers", Some(SyncMode::Incremental));
    failed.fail("boom");
    let report = SyncReport::from_streams(
        vec![StreamReport::new("orders", Some(SyncMode::FullRefresh)), failed],
        crate::state::SyncState::new(),
        12,
    );

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["status"], json!("PARTIAL"));
    assert_eq!(value["streams"][0]["status"], json!("SUCCEEDED"));
    assert_eq!(value["streams"][1]["status"], json!("FAILED"));
    assert_eq!(value["streams"][1]["reason"], json!("boom"));
    assert_eq!(value["streams"][1]["mode"], json!("incremental"));
}
