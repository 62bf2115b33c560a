//! Core data model.
//!
//! A work item is an order that needs processing. It is created by the
//! generator, handed to exactly one worker, and turned into exactly one
//! result record for the aggregator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work flowing through the pipeline.
///
/// Immutable once generated. Ownership moves with each channel hand-off, so
/// no two stages ever hold the same item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Assigned by the generator, 1..=N in generation order.
    pub id: WorkId,

    /// Who placed the order.
    pub customer: String,

    /// Ordered item names. Never empty.
    pub items: Vec<String>,

    /// Monetary total. Non-negative.
    pub total_amount: f64,
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub u64);

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Result Record
// ---------------------------------------------------------------------------

/// Outcome of processing one work item, produced once by the worker that
/// handled it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: WorkId,
    pub customer: String,
    pub success: bool,
    /// Duration of the final attempt.
    pub elapsed: Duration,
    /// Number of processing invocations, 1..=max_attempts.
    pub attempts: u32,
    /// Failure description from the last attempt. Present iff `!success`.
    pub failure: Option<String>,
}

impl ResultRecord {
    pub fn succeeded(item: &WorkItem, elapsed: Duration, attempts: u32) -> Self {
        Self {
            id: item.id,
            customer: item.customer.clone(),
            success: true,
            elapsed,
            attempts,
            failure: None,
        }
    }

    pub fn failed(
        item: &WorkItem,
        elapsed: Duration,
        attempts: u32,
        failure: impl Into<String>,
    ) -> Self {
        Self {
            id: item.id,
            customer: item.customer.clone(),
            success: false,
            elapsed,
            attempts,
            failure: Some(failure.into()),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Lifecycle stage of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Created by the generator, waiting for a worker.
    Generated,
    /// A worker is running an attempt.
    InFlight,
    /// An attempt succeeded. Terminal.
    Succeeded,
    /// Every attempt failed. Terminal.
    RetriesExhausted,
    /// Result record handed to the aggregator.
    Recorded,
}

impl Stage {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, to),
            (Generated, InFlight)
                | (InFlight, InFlight)  // retry
                | (InFlight, Succeeded)
                | (InFlight, RetriesExhausted)
                | (Succeeded, Recorded)
                | (RetriesExhausted, Recorded)
        )
    }

    /// Is this a terminal processing outcome?
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Succeeded | Stage::RetriesExhausted)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Generated => "generated",
            Stage::InFlight => "in_flight",
            Stage::Succeeded => "succeeded",
            Stage::RetriesExhausted => "retries_exhausted",
            Stage::Recorded => "recorded",
        };
        write!(f, "{s}")
    }
}
