//! # orderflow
//!
//! Concurrent order-processing pipeline: a generator emits orders, a fixed
//! pool of workers processes each with bounded retries, and an aggregator
//! tallies the results. Stages are connected by zero-capacity hand-off
//! channels with single-owner close, so shutdown is deterministic and no
//! result is lost or duplicated.

pub mod config;
pub mod error;
pub mod event;
pub mod handoff;
pub mod model;
pub mod pipeline;
pub mod telemetry;
