//! Worker loop: pull one job, run the pipeline, settle the message.

use std::future::Future;

use serde::Serialize;
use tracing::{info, warn};

use super::broker::QueueError;
use super::pipeline::{Outcome, Pipeline};
use super::queue::{Consumer, JobDelivery, JobQueue};

/// Counters reported when the worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub completed: u64,
    pub dead_lettered: u64,
    pub callbacks_failed: u64,
}

impl WorkerStats {
    fn observe(&mut self, outcome: &Outcome) {
        self.processed += 1;
        if outcome.is_success() {
            self.completed += 1;
        } else {
            self.dead_lettered += 1;
        }
        if !outcome.delivered {
            self.callbacks_failed += 1;
        }
    }
}

/// Consumes the job queue one job at a time
pub struct Worker {
    consumer: Consumer,
    pipeline: Pipeline,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(queue: &JobQueue, pipeline: Pipeline) -> Self {
        Self {
            consumer: queue.consume(),
            pipeline,
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Process jobs until `shutdown` resolves.
    ///
    /// Shutdown is only observed between jobs; a job that has been pulled
    /// always runs to a terminal state first.
    pub async fn run<S>(&mut self, shutdown: S) -> Result<WorkerStats, QueueError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Worker started");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                delivery = self.consumer.next() => delivery?,
            };
            self.handle(delivery).await?;
        }

        info!(
            processed = self.stats.processed,
            completed = self.stats.completed,
            dead_lettered = self.stats.dead_lettered,
            "Worker stopped"
        );
        Ok(self.stats)
    }

    /// Process a single job if one is ready; `None` when the queue is empty
    pub async fn run_once(&mut self) -> Result<Option<Outcome>, QueueError> {
        match self.consumer.try_next().await? {
            Some(delivery) => self.handle(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run the pipeline, then ack on success or dead-letter on failure
    async fn handle(&mut self, delivery: JobDelivery) -> Result<Outcome, QueueError> {
        if delivery.redelivered() {
            warn!(job_id = %delivery.job.job_id, "Job redelivered after an unacknowledged attempt");
        }

        let outcome = self.pipeline.process(&delivery.job).await;
        self.stats.observe(&outcome);

        if outcome.is_success() {
            self.consumer.ack(delivery).await?;
        } else {
            self.consumer.reject(delivery).await?;
        }

        Ok(outcome)
    }
}
