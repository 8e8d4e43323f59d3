//! JSON lines sink

use super::SinkWriter;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::stream::StreamDescriptor;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::io::Write;
use tokio::sync::Mutex;

/// Emits one `RECORD` message per record
///
/// Line format: `{"type":"RECORD","record":{"stream":..,"data":{..},"emitted_at":<ms>}}`
pub struct JsonLinesSink<W: Write + Send> {
    name: String,
    writer: Mutex<W>,
}

impl JsonLinesSink<std::io::Stdout> {
    /// Sink writing to stdout
    pub fn stdout(name: impl Into<String>) -> Self {
        Self::new(name, std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Sink writing to any writer
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Take back the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> SinkWriter for JsonLinesSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, stream: &StreamDescriptor, batch: &[Record]) -> Result<()> {
        let emitted_at = Utc::now().timestamp_millis();
        let mut writer = self.writer.lock().await;

        for record in batch {
            let message = json!({
                "type": "RECORD",
                "record": {
                    "stream": stream.name,
                    "data": record,
                    "emitted_at": emitted_at,
                }
            });
            serde_json::to_writer(&mut *writer, &message)?;
            writer.write_all(b"\n")?;
        }

        writer
            .flush()
            .map_err(|e| Error::sink_write(&self.name, e.to_string()))
    }
}
