//! Headless mode - NDJSON event output
//!
//! Every lifecycle event is written to stdout as one JSON object per line,
//! with a millisecond timestamp added. Logs go to the log file, never to
//! stdout, so the stream can be parsed by scripts and supervisors.
//!
//! # Example Output
//!
//! ```json
//! {"event":"service_starting","timestamp":1704700001000}
//! {"event":"status_update","state":"starting","timestamp":1704700001200}
//! {"event":"service_started","timestamp":1704700003000}
//! {"event":"query_response","query":"get-service-status","value":"started","timestamp":1704700004000}
//! ```

pub mod runner;

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use hivekeeper_app::{Observer, QueryResponse};
use hivekeeper_core::prelude::*;
use hivekeeper_core::ServiceEvent;

/// Lines the runner writes in addition to lifecycle events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Answer to a control-plane query read from stdin
    QueryResponse {
        query: &'static str,
        value: QueryResponse,
        timestamp: i64,
    },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        match serde_json::to_value(self) {
            Ok(value) => write_line(&mut io::stdout().lock(), &value),
            Err(e) => error!("Failed to serialize headless event: {}", e),
        }
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn query_response(query: &'static str, value: QueryResponse) -> Self {
        Self::QueryResponse {
            query,
            value,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
            timestamp: Self::now(),
        }
    }
}

/// JSON object for a lifecycle event, with `timestamp` added
pub fn event_line(event: &ServiceEvent, timestamp: i64) -> Result<Value> {
    let mut value = serde_json::to_value(event)?;
    if let Value::Object(map) = &mut value {
        map.insert("timestamp".to_string(), Value::from(timestamp));
    }
    Ok(value)
}

fn write_line<W: Write>(writer: &mut W, value: &Value) {
    if let Err(e) = writeln!(writer, "{}", value) {
        error!("Failed to write headless event: {}", e);
        return;
    }
    if let Err(e) = writer.flush() {
        error!("Failed to flush headless output: {}", e);
    }
}

/// Observer writing each event as one NDJSON line
pub struct NdjsonObserver<W> {
    writer: Mutex<W>,
}

impl NdjsonObserver<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> NdjsonObserver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> Observer for NdjsonObserver<W> {
    fn name(&self) -> &str {
        "ndjson"
    }

    fn deliver(&self, event: &ServiceEvent) -> Result<()> {
        let line = event_line(event, Utc::now().timestamp_millis())?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::observer_delivery("ndjson writer poisoned"))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivekeeper_core::{DownloadProgress, LifecycleState};

    #[test]
    fn test_event_line_adds_timestamp() {
        let line = event_line(&ServiceEvent::ServiceStarted, 1_700_000_000_000).unwrap();
        assert_eq!(
            line.to_string(),
            r#"{"event":"service_started","timestamp":1700000000000}"#
        );
    }

    #[test]
    fn test_event_line_payloads() {
        let line = event_line(&ServiceEvent::status(LifecycleState::Stopping), 1).unwrap();
        assert_eq!(line["event"], "status_update");
        assert_eq!(line["state"], "stopping");

        let line = event_line(
            &ServiceEvent::DownloadProgress(DownloadProgress::new(512, 2048)),
            1,
        )
        .unwrap();
        assert_eq!(line["event"], "download_progress");
        assert_eq!(line["completed"], 512);
        assert_eq!(line["total"], 2048);
    }

    #[test]
    fn test_ndjson_observer_writes_one_line_per_event() {
        let observer = NdjsonObserver::new(Vec::new());
        observer.deliver(&ServiceEvent::ServiceStarting).unwrap();
        observer
            .deliver(&ServiceEvent::download_error("HTTP 404"))
            .unwrap();

        let output = String::from_utf8(observer.into_inner()).unwrap();
        let lines: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "service_starting");
        assert_eq!(lines[1]["message"], "HTTP 404");
        assert!(lines[1]["timestamp"].is_i64());
    }

    #[test]
    fn test_query_response_serialization() {
        let event = HeadlessEvent::query_response("is-service-started", QueryResponse::IsStarted(false));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "query_response");
        assert_eq!(value["query"], "is-service-started");
        assert_eq!(value["value"], false);
    }
}
