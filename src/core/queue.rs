//! Durable job queue on top of a [`Broker`].
//!
//! Jobs are published persistently to a durable primary queue whose
//! dead-letter target is a second durable queue. A consumer holds at most
//! one unsettled delivery at a time and settles it exactly once.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::broker::{Broker, Delivery, QueueError, QueueSpec, QueuedMessage};
use super::error::Classify;
use super::retry::{with_backoff, RetryPolicy};
use crate::domain::Job;

/// Queue names and retry behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Primary work queue
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Where rejected jobs end up
    #[serde(default = "default_dead_letter_name")]
    pub dead_letter: String,

    /// Publish retries (5 attempts, 2^attempt seconds)
    #[serde(default = "RetryPolicy::enqueue")]
    pub enqueue_retry: RetryPolicy,

    /// Retries for fetch/ack/reject; fetch keeps going past max_attempts
    #[serde(default = "default_consume_retry")]
    pub consume_retry: RetryPolicy,

    /// How long an idle consumer waits before polling again
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_queue_name() -> String {
    "media_jobs".to_string()
}
fn default_dead_letter_name() -> String {
    "media_jobs.dead".to_string()
}
fn default_consume_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_delay_ms: 500,
        max_delay_ms: 30_000,
        backoff_multiplier: 2.0,
    }
}
fn default_poll_interval() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            dead_letter: default_dead_letter_name(),
            enqueue_retry: RetryPolicy::enqueue(),
            consume_retry: default_consume_retry(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Counts shown by `mediaq dead-letters` and the worker on startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub ready: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

/// A job handed to a consumer together with its broker delivery
#[derive(Debug)]
pub struct JobDelivery {
    pub job: Job,
    delivery: Delivery,
}

impl JobDelivery {
    pub fn message_id(&self) -> Uuid {
        self.delivery.message_id
    }

    /// Handed out before without being settled (e.g. after a worker crash)
    pub fn redelivered(&self) -> bool {
        self.delivery.redelivered
    }
}

/// Durable job queue with a dead-letter queue
#[derive(Clone)]
pub struct JobQueue {
    broker: Arc<dyn Broker>,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(broker: Arc<dyn Broker>, config: QueueConfig) -> Self {
        Self { broker, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Declare the dead-letter queue, then the primary queue routing to it
    pub async fn declare(&self) -> Result<(), QueueError> {
        self.broker
            .declare(&QueueSpec::durable(&self.config.dead_letter))
            .await?;
        self.broker
            .declare(&QueueSpec::durable(&self.config.name).with_dead_letter(&self.config.dead_letter))
            .await
    }

    /// Publish a job persistently.
    ///
    /// Transport failures are retried per `enqueue_retry`; once exhausted
    /// the caller gets [`QueueError::EnqueueExhausted`].
    pub async fn enqueue(&self, job: &Job) -> Result<Uuid, QueueError> {
        let body = job.to_payload()?;
        let policy = &self.config.enqueue_retry;

        let published = with_backoff(policy, "enqueue", |attempt| {
            let body = body.as_str();
            async move {
                debug!(job_id = %job.job_id, attempt, "Publishing job");
                self.declare().await?;
                self.broker.publish(&self.config.name, body, true).await
            }
        })
        .await;

        match published {
            Ok(message_id) => {
                info!(
                    job_id = %job.job_id,
                    %message_id,
                    queue = %self.config.name,
                    "Job enqueued"
                );
                Ok(message_id)
            }
            Err(e) if e.kind().is_retryable() => {
                error!(job_id = %job.job_id, attempts = policy.max_attempts, error = %e, "Enqueue failed");
                Err(QueueError::EnqueueExhausted {
                    attempts: policy.max_attempts,
                    last_error: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Start consuming the primary queue with prefetch = 1
    pub fn consume(&self) -> Consumer {
        Consumer {
            queue: self.clone(),
            in_flight: None,
        }
    }

    /// Unsettled messages on the dead-letter queue
    pub async fn dead_letters(&self) -> Result<Vec<QueuedMessage>, QueueError> {
        self.declare().await?;
        self.broker.messages(&self.config.dead_letter).await
    }

    /// Move a dead-lettered message back onto the primary queue
    pub async fn replay_dead_letter(&self, message_id: Uuid) -> Result<Uuid, QueueError> {
        self.declare().await?;
        let new_id = self
            .broker
            .republish(&self.config.dead_letter, message_id, &self.config.name)
            .await?;

        info!(%message_id, %new_id, queue = %self.config.name, "Dead-lettered message replayed");
        Ok(new_id)
    }

    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        self.declare().await?;
        let primary = self.broker.messages(&self.config.name).await?;
        let dead = self.broker.messages(&self.config.dead_letter).await?;

        let in_flight = primary.iter().filter(|m| m.in_flight).count();
        Ok(QueueStatus {
            ready: primary.len() - in_flight,
            in_flight,
            dead_lettered: dead.len(),
        })
    }
}

/// Pulls jobs off the primary queue one at a time
pub struct Consumer {
    queue: JobQueue,
    /// Tag of the delivery awaiting ack/reject
    in_flight: Option<Uuid>,
}

impl Consumer {
    /// Wait until a valid job is available.
    ///
    /// Fails with [`QueueError::PrefetchExceeded`] while the previous
    /// delivery is unsettled.
    pub async fn next(&mut self) -> Result<JobDelivery, QueueError> {
        let poll = Duration::from_millis(self.queue.config.poll_interval_ms);

        loop {
            if let Some(delivery) = self.try_next().await? {
                return Ok(delivery);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Take a valid job if one is ready right now
    pub async fn try_next(&mut self) -> Result<Option<JobDelivery>, QueueError> {
        if self.in_flight.is_some() {
            return Err(QueueError::PrefetchExceeded);
        }

        loop {
            let Some(delivery) = self.fetch().await? else {
                return Ok(None);
            };

            match Job::from_payload(delivery.body.as_bytes()) {
                Ok(job) => {
                    debug!(
                        job_id = %job.job_id,
                        message_id = %delivery.message_id,
                        redelivered = delivery.redelivered,
                        "Job received"
                    );
                    self.in_flight = Some(delivery.tag);
                    return Ok(Some(JobDelivery { job, delivery }));
                }
                Err(e) => {
                    warn!(
                        message_id = %delivery.message_id,
                        error = %e,
                        "Undecodable job payload, dead-lettering"
                    );
                    self.settle(&delivery, Settle::Reject).await?;
                }
            }
        }
    }

    /// Settle a processed job; the message is removed from the queue.
    ///
    /// The prefetch slot stays taken if settling fails.
    pub async fn ack(&mut self, delivery: JobDelivery) -> Result<(), QueueError> {
        self.settle(&delivery.delivery, Settle::Ack).await?;
        self.release(&delivery);
        info!(job_id = %delivery.job.job_id, message_id = %delivery.message_id(), "Job acknowledged");
        Ok(())
    }

    /// Settle a failed job; the message moves to the dead-letter queue
    pub async fn reject(&mut self, delivery: JobDelivery) -> Result<(), QueueError> {
        self.settle(&delivery.delivery, Settle::Reject).await?;
        self.release(&delivery);
        warn!(
            job_id = %delivery.job.job_id,
            message_id = %delivery.message_id(),
            dead_letter = %self.queue.config.dead_letter,
            "Job rejected"
        );
        Ok(())
    }

    fn release(&mut self, delivery: &JobDelivery) {
        if self.in_flight == Some(delivery.delivery.tag) {
            self.in_flight = None;
        }
    }

    /// Fetch, retrying transport errors with capped backoff for as long as it takes
    async fn fetch(&self) -> Result<Option<Delivery>, QueueError> {
        let policy = &self.queue.config.consume_retry;
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);

            match self.queue.broker.fetch(&self.queue.config.name).await {
                Ok(delivery) => return Ok(delivery),
                Err(e) if e.kind().is_retryable() => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        queue = %self.queue.config.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn settle(&self, delivery: &Delivery, settle: Settle) -> Result<(), QueueError> {
        let broker = &self.queue.broker;
        with_backoff(&self.queue.config.consume_retry, settle.as_str(), |_| async move {
            match settle {
                Settle::Ack => broker.ack(delivery).await,
                Settle::Reject => broker.reject(delivery, false).await,
            }
        })
        .await
    }
}

#[derive(Debug, Clone, Copy)]
enum Settle {
    Ack,
    Reject,
}

impl Settle {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Reject => "reject",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::broker::FileBroker;
    use crate::domain::JobRequest;
    use tempfile::TempDir;

    fn test_config() -> QueueConfig {
        QueueConfig {
            enqueue_retry: RetryPolicy::immediate(5),
            consume_retry: RetryPolicy::immediate(3),
            poll_interval_ms: 5,
            ..Default::default()
        }
    }

    fn job(id: &str) -> Job {
        JobRequest {
            job_id: Some(id.to_string()),
            source: "/media/a.mp4".to_string(),
            languages: vec!["fr".to_string()],
            callback_url: "https://example.com/cb".to_string(),
        }
        .validate()
        .unwrap()
    }

    fn open(dir: &TempDir) -> (Arc<FileBroker>, JobQueue) {
        let broker = Arc::new(FileBroker::open(dir.path()).unwrap());
        let queue = JobQueue::new(broker.clone(), test_config());
        (broker, queue)
    }

    #[tokio::test]
    async fn test_enqueue_then_consume() {
        let temp = TempDir::new().unwrap();
        let (_, queue) = open(&temp);

        queue.enqueue(&job("job-1")).await.unwrap();

        let mut consumer = queue.consume();
        let delivery = consumer.next().await.unwrap();
        assert_eq!(delivery.job.job_id, "job-1");
        assert!(!delivery.redelivered());

        consumer.ack(delivery).await.unwrap();
        assert_eq!(queue.status().await.unwrap(), QueueStatus::default());
    }

    #[tokio::test]
    async fn test_prefetch_is_one() {
        let temp = TempDir::new().unwrap();
        let (_, queue) = open(&temp);

        queue.enqueue(&job("a")).await.unwrap();
        queue.enqueue(&job("b")).await.unwrap();

        let mut consumer = queue.consume();
        let first = consumer.next().await.unwrap();
        assert!(matches!(
            consumer.try_next().await,
            Err(QueueError::PrefetchExceeded)
        ));

        consumer.ack(first).await.unwrap();
        let second = consumer.next().await.unwrap();
        assert_eq!(second.job.job_id, "b");
    }

    #[tokio::test]
    async fn test_reject_dead_letters_and_replay() {
        let temp = TempDir::new().unwrap();
        let (_, queue) = open(&temp);

        queue.enqueue(&job("doomed")).await.unwrap();
        let mut consumer = queue.consume();
        let delivery = consumer.next().await.unwrap();
        consumer.reject(delivery).await.unwrap();

        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert!(consumer.try_next().await.unwrap().is_none());

        queue.replay_dead_letter(dead[0].message_id).await.unwrap();
        assert!(queue.dead_letters().await.unwrap().is_empty());

        let again = consumer.next().await.unwrap();
        assert_eq!(again.job.job_id, "doomed");
    }

    #[tokio::test]
    async fn test_malformed_body_goes_to_dead_letter() {
        let temp = TempDir::new().unwrap();
        let (broker, queue) = open(&temp);
        queue.declare().await.unwrap();

        broker.publish("media_jobs", "not json", true).await.unwrap();
        queue.enqueue(&job("good")).await.unwrap();

        let mut consumer = queue.consume();
        let delivery = consumer.next().await.unwrap();
        assert_eq!(delivery.job.job_id, "good");

        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, "not json");
    }

    #[tokio::test]
    async fn test_unacked_job_survives_worker_crash() {
        let temp = TempDir::new().unwrap();

        {
            let (_, queue) = open(&temp);
            queue.enqueue(&job("crash")).await.unwrap();
            let mut consumer = queue.consume();
            let _held = consumer.next().await.unwrap();
            // Dropped without ack
        }

        let (_, queue) = open(&temp);
        let mut consumer = queue.consume();
        let delivery = consumer.next().await.unwrap();
        assert_eq!(delivery.job.job_id, "crash");
        assert!(delivery.redelivered());
    }

    /// Delegates to a file broker but refuses every ack
    struct AckRefusingBroker(FileBroker);

    #[async_trait::async_trait]
    impl Broker for AckRefusingBroker {
        async fn declare(&self, spec: &QueueSpec) -> Result<(), QueueError> {
            self.0.declare(spec).await
        }

        async fn publish(&self, queue: &str, body: &str, persistent: bool) -> Result<Uuid, QueueError> {
            self.0.publish(queue, body, persistent).await
        }

        async fn fetch(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
            self.0.fetch(queue).await
        }

        async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
            Err(QueueError::UnknownDelivery(delivery.tag))
        }

        async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
            self.0.reject(delivery, requeue).await
        }

        async fn messages(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueError> {
            self.0.messages(queue).await
        }

        async fn republish(&self, from: &str, message_id: Uuid, to: &str) -> Result<Uuid, QueueError> {
            self.0.republish(from, message_id, to).await
        }
    }

    #[tokio::test]
    async fn test_failed_ack_keeps_prefetch_slot() {
        let temp = TempDir::new().unwrap();
        let broker = AckRefusingBroker(FileBroker::open(temp.path()).unwrap());
        let queue = JobQueue::new(Arc::new(broker), test_config());

        queue.enqueue(&job("a")).await.unwrap();
        queue.enqueue(&job("b")).await.unwrap();

        let mut consumer = queue.consume();
        let first = consumer.next().await.unwrap();
        assert!(consumer.ack(first).await.is_err());

        assert!(matches!(
            consumer.try_next().await,
            Err(QueueError::PrefetchExceeded)
        ));
        assert_eq!(queue.status().await.unwrap().in_flight, 1);
    }
}
