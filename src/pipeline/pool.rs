//! Worker pool and the shutdown coordinator that closes the outtake.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::event::EventLog;
use crate::handoff;
use crate::model::{ResultRecord, WorkItem};

use super::processor::Processor;
use super::worker::{RetryingWorker, WorkerStats};

/// A fixed number of workers sharing one intake and one outtake.
pub struct WorkerPool {
    size: usize,
    workers: JoinSet<Result<WorkerStats>>,
}

impl WorkerPool {
    /// Start `size` workers. Each gets its own intake receiver and a
    /// send-only outtake handle; none of them can close either channel.
    pub fn spawn<P: Processor>(
        size: usize,
        intake: handoff::Receiver<WorkItem>,
        outtake: &handoff::Sender<ResultRecord>,
        processor: Arc<P>,
        max_attempts: u32,
        events: Arc<EventLog>,
    ) -> Self {
        let mut workers = JoinSet::new();
        for id in 0..size {
            let worker =
                RetryingWorker::new(id, Arc::clone(&processor), max_attempts, Arc::clone(&events));
            workers.spawn(worker.run(intake.clone(), outtake.producer()));
        }
        info!(workers = size, "worker pool started");
        Self { size, workers }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for every worker to exit.
    ///
    /// Keeps waiting after a failure so no worker is left running; returns
    /// the first error seen.
    pub async fn join(mut self) -> Result<Vec<WorkerStats>> {
        let mut stats = Vec::with_capacity(self.size);
        let mut first_error = None;

        while let Some(joined) = self.workers.join_next().await {
            match joined.map_err(Error::from).and_then(|r| r) {
                Ok(s) => stats.push(s),
                Err(e) => {
                    error!("worker failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                stats.sort_by_key(|s| s.worker);
                Ok(stats)
            }
        }
    }
}

/// Closes the outtake once every worker has finished.
///
/// Holds the outtake's owning [`handoff::Sender`], so it is the only
/// component able to close it, and it does so exactly once.
pub struct ShutdownCoordinator {
    pool: WorkerPool,
    outtake: handoff::Sender<ResultRecord>,
}

impl ShutdownCoordinator {
    pub fn new(pool: WorkerPool, outtake: handoff::Sender<ResultRecord>) -> Self {
        Self { pool, outtake }
    }

    /// Join the pool, then close the outtake.
    ///
    /// The outtake is closed even if a worker failed, so the aggregator
    /// still terminates. A worker error takes precedence over a close error.
    pub async fn run(self) -> Result<Vec<WorkerStats>> {
        let workers = self.pool.size();
        let joined = self.pool.join().await;
        let closed = self.outtake.close();
        match &closed {
            Ok(()) => info!(workers, "all workers finished, outtake closed"),
            Err(e) => error!("closing outtake failed: {e}"),
        }
        let stats = joined?;
        closed?;
        Ok(stats)
    }
}
