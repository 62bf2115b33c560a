//! Metric instrument factories for orderflow.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("orderflow")
}

/// Counter: orders emitted by the generator.
pub fn orders_generated() -> Counter<u64> {
    meter()
        .u64_counter("orderflow.orders.generated")
        .with_description("Number of orders generated")
        .build()
}

/// Counter: processing attempts.
/// Labels: `outcome` ("ok" | "failed").
pub fn attempts() -> Counter<u64> {
    meter()
        .u64_counter("orderflow.attempts")
        .with_description("Number of processing attempts")
        .build()
}

/// Counter: result records delivered to the aggregator.
/// Labels: `outcome` ("succeeded" | "retries_exhausted").
pub fn results() -> Counter<u64> {
    meter()
        .u64_counter("orderflow.results")
        .with_description("Number of result records delivered")
        .build()
}

/// Histogram: single attempt duration in milliseconds.
pub fn attempt_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("orderflow.attempt.duration_ms")
        .with_description("Processing attempt duration in milliseconds")
        .with_unit("ms")
        .build()
}

pub fn outcome(label: &'static str) -> [KeyValue; 1] {
    [KeyValue::new("outcome", label)]
}
