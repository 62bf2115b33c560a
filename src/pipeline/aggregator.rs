//! Aggregator: consumes results until the outtake closes and tallies them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{EventKind, EventLog};
use crate::handoff;
use crate::model::ResultRecord;

/// Final counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl Summary {
    pub fn record(&mut self, record: &ResultRecord) {
        self.total += 1;
        if record.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Percentage of successful orders; 0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        percentage(self.succeeded, self.total)
    }

    /// Percentage of failed orders; 0 for an empty run.
    pub fn failure_rate(&self) -> f64 {
        percentage(self.failed, self.total)
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Statistics:")?;
        writeln!(f, "Total orders: {}", self.total)?;
        writeln!(
            f,
            "Succeeded: {} ({:.2}%)",
            self.succeeded,
            self.success_rate()
        )?;
        write!(f, "Failed: {} ({:.2}%)", self.failed, self.failure_rate())
    }
}

pub struct Aggregator {
    summary: Summary,
    events: Arc<EventLog>,
}

impl Aggregator {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self {
            summary: Summary::default(),
            events,
        }
    }

    /// Consume results until the outtake is closed and drained. Arrival
    /// order is whatever the workers produce.
    pub async fn run(mut self, outtake: handoff::Receiver<ResultRecord>) -> Summary {
        while let Some(record) = outtake.recv().await {
            self.summary.record(&record);
            self.events.emit(EventKind::delivered(&record));
        }
        debug!(total = self.summary.total, "outtake drained, aggregator finished");
        self.summary
    }
}
