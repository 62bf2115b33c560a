//! Structured events emitted by the pipeline.
//!
//! Every generated order, failed attempt, and delivered result becomes an
//! [`Event`]. Sinks turn them into the human report on stdout, JSON lines,
//! or an in-memory log for tests.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ResultRecord, WorkId, WorkItem};

/// A structured event emitted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    OrderGenerated {
        id: WorkId,
        customer: String,
        items: Vec<String>,
        total_amount: f64,
    },
    AttemptFailed {
        id: WorkId,
        worker: usize,
        attempt: u32,
        max_attempts: u32,
        reason: String,
        will_retry: bool,
    },
    ResultDelivered {
        id: WorkId,
        customer: String,
        success: bool,
        elapsed_ms: u64,
        attempts: u32,
        failure: Option<String>,
    },
}

impl EventKind {
    pub fn generated(item: &WorkItem) -> Self {
        EventKind::OrderGenerated {
            id: item.id,
            customer: item.customer.clone(),
            items: item.items.clone(),
            total_amount: item.total_amount,
        }
    }

    pub fn delivered(record: &ResultRecord) -> Self {
        EventKind::ResultDelivered {
            id: record.id,
            customer: record.customer.clone(),
            success: record.success,
            elapsed_ms: record.elapsed_ms(),
            attempts: record.attempts,
            failure: record.failure.clone(),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::OrderGenerated {
                id,
                customer,
                items,
                total_amount,
            } => write!(
                f,
                "generated order {id}: {customer} [{}] {total_amount:.2}",
                items.join(", ")
            ),
            EventKind::AttemptFailed {
                id,
                attempt,
                max_attempts,
                reason,
                will_retry,
                ..
            } => {
                let next = if *will_retry { "retrying" } else { "giving up" };
                write!(
                    f,
                    "retry [{attempt}/{max_attempts}] for order {id}: {reason}; {next}"
                )
            }
            EventKind::ResultDelivered {
                id,
                customer,
                success: true,
                elapsed_ms,
                ..
            } => write!(f, "success [{id}] {customer} ({elapsed_ms}ms)"),
            EventKind::ResultDelivered {
                id,
                customer,
                failure,
                ..
            } => write!(
                f,
                "failure [{id}] {customer}: {}",
                failure.as_deref().unwrap_or("unknown failure")
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for pipeline events. Called concurrently from every stage.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Stamps events with a sequence number and timestamp and forwards them.
pub struct EventLog {
    seq: AtomicU64,
    sink: Box<dyn EventSink>,
}

impl EventLog {
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            seq: AtomicU64::new(0),
            sink: Box::new(sink),
        }
    }

    pub fn emit(&self, kind: EventKind) {
        let event = Event {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Utc::now(),
            kind,
        };
        self.sink.record(&event);
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("seq", &self.seq.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Human-readable status lines.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }
}

impl EventSink for ConsoleSink {
    fn record(&self, event: &Event) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(out, "{}", event.kind);
    }
}

/// One JSON object per line.
pub struct JsonSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonSink {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }
}

impl EventSink for JsonSink {
    fn record(&self, event: &Event) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(seq = event.seq, "failed to serialize event: {e}");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(out, "{line}");
    }
}

/// Keeps every event in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in arrival order.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &Event) {}
}
