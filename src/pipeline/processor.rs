//! The processing step applied to each order.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::model::{WorkId, WorkItem};

/// One failed processing attempt. Expected and retryable; never a fault of
/// the pipeline itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("processing failed for order {id}: {reason}")]
pub struct ProcessingFailure {
    pub id: WorkId,
    pub reason: String,
}

impl ProcessingFailure {
    pub fn new(id: WorkId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// Does the work for one order. Must not mutate the item.
///
/// Shared by every worker in the pool, so implementations synchronize any
/// internal state themselves.
pub trait Processor: Send + Sync + 'static {
    fn process(
        &self,
        item: &WorkItem,
    ) -> impl Future<Output = Result<(), ProcessingFailure>> + Send;
}

/// A timed processing attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub elapsed: Duration,
    pub outcome: Result<(), ProcessingFailure>,
}

/// Run one attempt and measure it.
pub async fn timed<P: Processor>(processor: &P, item: &WorkItem) -> Attempt {
    let started = Instant::now();
    let outcome = processor.process(item).await;
    Attempt {
        elapsed: started.elapsed(),
        outcome,
    }
}

/// Sleeps for a random time, then succeeds with a fixed probability.
#[derive(Debug)]
pub struct SimulatedProcessor {
    rng: Mutex<StdRng>,
    min: Duration,
    max: Duration,
    success_probability: f64,
}

impl SimulatedProcessor {
    pub fn new(rng: StdRng, (min, max): (Duration, Duration), success_probability: f64) -> Self {
        Self {
            rng: Mutex::new(rng),
            min,
            max,
            success_probability: success_probability.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &PipelineConfig, rng: StdRng) -> Self {
        Self::new(rng, config.processing_range(), config.success_probability)
    }

    /// Draw the duration and the outcome up front; the lock is never held
    /// across the sleep.
    fn roll(&self) -> (Duration, bool) {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let duration = if self.min >= self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        };
        (duration, rng.gen_bool(self.success_probability))
    }
}

impl Processor for SimulatedProcessor {
    async fn process(&self, item: &WorkItem) -> Result<(), ProcessingFailure> {
        let (duration, success) = self.roll();
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        if success {
            Ok(())
        } else {
            Err(ProcessingFailure::new(item.id, "simulated fault"))
        }
    }
}
