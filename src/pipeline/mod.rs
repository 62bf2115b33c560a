//! The order-processing pipeline.
//!
//! ```text
//! Generator -> intake -> N x RetryingWorker -> outtake -> Aggregator
//!                                  ^
//!                       ShutdownCoordinator (closes outtake)
//! ```
//!
//! Both channels are zero-capacity hand-offs. The generator owns the
//! intake and closes it after the last order; the shutdown coordinator owns
//! the outtake and closes it once every worker has exited.

pub mod aggregator;
pub mod generator;
pub mod pool;
pub mod processor;
pub mod worker;

pub use aggregator::{Aggregator, Summary};
pub use generator::Generator;
pub use pool::{ShutdownCoordinator, WorkerPool};
pub use processor::{Attempt, ProcessingFailure, Processor, SimulatedProcessor};
pub use worker::{RetryingWorker, WorkerStats};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::event::{ConsoleSink, EventLog, EventSink};
use crate::handoff;
use crate::telemetry::work::start_run_span;

/// RNG stream ids derived from the configured seed.
const GENERATOR_STREAM: u64 = 0;
const PROCESSOR_STREAM: u64 = 1;

/// Everything a finished run reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Orders admitted to the intake.
    pub generated: u64,
    pub summary: Summary,
    pub workers: Vec<WorkerStats>,
}

/// A configured, not yet started pipeline.
pub struct Pipeline<P = SimulatedProcessor> {
    config: PipelineConfig,
    processor: Arc<P>,
    events: Arc<EventLog>,
}

impl Pipeline<SimulatedProcessor> {
    /// Validate the config and build a pipeline with the simulated
    /// processor, reporting to stdout.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let processor = SimulatedProcessor::from_config(&config, config.rng(PROCESSOR_STREAM));
        Ok(Self {
            config,
            processor: Arc::new(processor),
            events: Arc::new(EventLog::new(ConsoleSink::stdout())),
        })
    }
}

impl<P: Processor> Pipeline<P> {
    /// Replace the processing step.
    pub fn with_processor<Q: Processor>(self, processor: Q) -> Pipeline<Q> {
        Pipeline {
            config: self.config,
            processor: Arc::new(processor),
            events: self.events,
        }
    }

    /// Replace where events are reported.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Arc::new(EventLog::new(sink));
        self
    }

    /// Run to completion: every generated order yields exactly one result,
    /// and the call returns once the outtake has closed and drained.
    pub async fn run(self) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4();
        let span = start_run_span(&run_id, self.config.orders, self.config.workers);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(self, run_id: Uuid) -> Result<PipelineReport> {
        let started_at = Utc::now();
        info!(
            orders = self.config.orders,
            workers = self.config.workers,
            max_attempts = self.config.max_attempts,
            "pipeline starting"
        );

        let (intake_tx, intake_rx) = handoff::channel();
        let (outtake_tx, outtake_rx) = handoff::channel();

        let generator = Generator::new(
            &self.config,
            self.config.rng(GENERATOR_STREAM),
            Arc::clone(&self.events),
        )?;
        let generator = tokio::spawn(generator.run(intake_tx).in_current_span());

        let pool = WorkerPool::spawn(
            self.config.workers,
            intake_rx,
            &outtake_tx,
            Arc::clone(&self.processor),
            self.config.max_attempts,
            Arc::clone(&self.events),
        );
        let coordinator =
            tokio::spawn(ShutdownCoordinator::new(pool, outtake_tx).run().in_current_span());

        let summary = Aggregator::new(Arc::clone(&self.events)).run(outtake_rx).await;

        // Join both; a worker error takes precedence over the generator's.
        let workers = coordinator.await?;
        let generated = generator.await?;
        let workers = workers?;
        let generated = generated?;

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "pipeline finished"
        );

        Ok(PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            generated,
            summary,
            workers,
        })
    }
}
