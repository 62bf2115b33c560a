//! Pipeline span helpers.

use tracing::Span;
use uuid::Uuid;

use crate::model::{Stage, WorkId};

/// Span covering one whole pipeline run.
pub fn start_run_span(run_id: &Uuid, orders: u64, workers: usize) -> Span {
    tracing::info_span!(
        "pipeline.run",
        "run.id" = %run_id,
        "run.orders" = orders,
        "run.workers" = workers,
    )
}

/// Span for one order while a worker holds it.
///
/// `order.stage` is declared empty and updated by
/// [`record_stage_transition`].
pub fn start_order_span(id: WorkId, worker: usize) -> Span {
    tracing::debug_span!(
        "order.process",
        "order.id" = id.0,
        "order.worker" = worker,
        "order.stage" = tracing::field::Empty,
    )
}

/// Record a stage transition on the given span.
pub fn record_stage_transition(span: &Span, from: Stage, to: Stage) {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
    span.record("order.stage", tracing::field::display(to));
    span.in_scope(|| {
        tracing::debug!(%from, %to, "stage_transition");
    });
}
