//! Retrying worker: takes orders from the intake, processes each with a
//! bounded number of attempts, and emits exactly one result per order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span, debug};

use crate::error::Result;
use crate::event::{EventKind, EventLog};
use crate::handoff;
use crate::model::{ResultRecord, Stage, WorkItem};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_stage_transition, start_order_span};

use super::processor::{Processor, timed};

/// What one worker did over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker: usize,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Processing invocations across all orders.
    pub attempts: u64,
}

pub struct RetryingWorker<P> {
    id: usize,
    processor: Arc<P>,
    max_attempts: u32,
    events: Arc<EventLog>,
}

impl<P: Processor> RetryingWorker<P> {
    pub fn new(id: usize, processor: Arc<P>, max_attempts: u32, events: Arc<EventLog>) -> Self {
        Self {
            id,
            processor,
            max_attempts: max_attempts.max(1),
            events,
        }
    }

    /// Drain the intake. Ends when the intake is closed and empty.
    ///
    /// Processing failures never end the loop; only a failed hand-off to the
    /// outtake does.
    pub async fn run(
        self,
        intake: handoff::Receiver<WorkItem>,
        outtake: handoff::Producer<ResultRecord>,
    ) -> Result<WorkerStats> {
        let mut stats = WorkerStats {
            worker: self.id,
            ..WorkerStats::default()
        };

        while let Some(item) = intake.recv().await {
            let span = start_order_span(item.id, self.id);
            let record = self.process(item, &span).instrument(span.clone()).await;

            stats.processed += 1;
            stats.attempts += u64::from(record.attempts);
            if record.success {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }

            let terminal = if record.success {
                Stage::Succeeded
            } else {
                Stage::RetriesExhausted
            };
            outtake.send(record).await?;
            record_stage_transition(&span, terminal, Stage::Recorded);
        }

        debug!(worker = self.id, processed = stats.processed, "intake drained, worker exiting");
        Ok(stats)
    }

    /// Attempt until success or `max_attempts`, strictly one at a time.
    async fn process(&self, item: WorkItem, span: &Span) -> ResultRecord {
        let attempts = metrics::attempts();
        let durations = metrics::attempt_duration_ms();
        let results = metrics::results();

        record_stage_transition(span, Stage::Generated, Stage::InFlight);
        let mut attempt = 1;
        loop {
            let outcome = timed(self.processor.as_ref(), &item).await;
            durations.record(outcome.elapsed.as_secs_f64() * 1000.0, &[]);

            match outcome.outcome {
                Ok(()) => {
                    attempts.add(1, &metrics::outcome("ok"));
                    results.add(1, &metrics::outcome("succeeded"));
                    record_stage_transition(span, Stage::InFlight, Stage::Succeeded);
                    return ResultRecord::succeeded(&item, outcome.elapsed, attempt);
                }
                Err(failure) => {
                    attempts.add(1, &metrics::outcome("failed"));
                    let will_retry = attempt < self.max_attempts;
                    debug!(
                        id = %item.id,
                        attempt,
                        max_attempts = self.max_attempts,
                        will_retry,
                        "{failure}"
                    );
                    self.events.emit(EventKind::AttemptFailed {
                        id: item.id,
                        worker: self.id,
                        attempt,
                        max_attempts: self.max_attempts,
                        reason: failure.to_string(),
                        will_retry,
                    });

                    if !will_retry {
                        results.add(1, &metrics::outcome("retries_exhausted"));
                        record_stage_transition(span, Stage::InFlight, Stage::RetriesExhausted);
                        return ResultRecord::failed(
                            &item,
                            outcome.elapsed,
                            attempt,
                            failure.to_string(),
                        );
                    }
                    record_stage_transition(span, Stage::InFlight, Stage::InFlight);
                }
            }
            attempt += 1;
        }
    }
}
