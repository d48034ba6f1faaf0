//! In-process log capture
//!
//! A [`LogSink`] collects [`LogEntry`] values during a run. Nothing is written
//! anywhere until the owner drains the sink, which keeps persistence an
//! explicit step of the pipeline instead of a side effect of logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// A single captured log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub thread_id: Option<String>,
    pub file_name: Option<String>,
}

impl LogEntry {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.into(),
            message: message.into(),
            thread_id: Some(current_thread_id()),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Destination for captured log entries
pub trait LogSink: Send + Sync {
    fn record(&self, entry: LogEntry);

    /// Remove and return everything recorded so far, oldest first
    fn drain(&self) -> Vec<LogEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sink backed by a mutex-guarded vector
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the entries without draining them
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        // A poisoned buffer still holds valid entries.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, entry: LogEntry) {
        self.lock().push(entry);
    }

    fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.lock())
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// `tracing` layer that copies every event into a [`LogSink`]
///
/// The event's `file` or `table` field, when present, becomes the entry's
/// `file_name`. Targets registered with [`SinkLayer::exclude_target`] are
/// skipped; use that for components that already record into the sink.
pub struct SinkLayer {
    sink: Arc<dyn LogSink>,
    excluded_targets: Vec<&'static str>,
}

impl SinkLayer {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            excluded_targets: Vec::new(),
        }
    }

    pub fn exclude_target(mut self, target: &'static str) -> Self {
        self.excluded_targets.push(target);
        self
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if self
            .excluded_targets
            .iter()
            .any(|target| metadata.target().starts_with(target))
        {
            return;
        }

        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        self.sink.record(LogEntry {
            timestamp: Utc::now(),
            level: metadata.level().to_string(),
            message: visitor.message.unwrap_or_default(),
            thread_id: Some(current_thread_id()),
            file_name: visitor.file_name,
        });
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: Option<String>,
    file_name: Option<String>,
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "file" | "table" => self.file_name = Some(value.to_string()),
            _ => {},
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{:?}", value)),
            "file" | "table" => self.file_name = Some(format!("{:?}", value).trim_matches('"').to_string()),
            _ => {},
        }
    }
}

fn current_thread_id() -> String {
    format!("{:?}", std::thread::current().id())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_memory_sink_drain_empties_buffer() {
        let sink = MemoryLogSink::new();
        sink.record(LogEntry::new("INFO", "first"));
        sink.record(LogEntry::new("ERROR", "second").with_file_name("mines.csv"));

        assert_eq!(sink.len(), 2);
        let drained = sink.drain();
        assert_eq!(drained[0].message, "first");
        assert_eq!(drained[1].file_name.as_deref(), Some("mines.csv"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_layer_captures_message_and_table() {
        let sink = Arc::new(MemoryLogSink::new());
        let subscriber = tracing_subscriber::registry()
            .with(SinkLayer::new(sink.clone()).exclude_target("lucent_common::skipped"));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(table = %"p_mines_csv_1", "Row skipped");
            tracing::info!(target: "lucent_common::skipped", "Not captured");
        });

        let entries = sink.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, "WARN");
        assert_eq!(entries[0].message, "Row skipped");
        assert_eq!(entries[0].file_name.as_deref(), Some("p_mines_csv_1"));
    }
}
