//! Job Queue Integration Tests
//!
//! Tests for enqueue retry behaviour, durability across broker restarts,
//! and dead-letter replay.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use mediaq::core::broker::{Delivery, QueueSpec};
use mediaq::core::{
    Broker, FileBroker, JobQueue, QueueConfig, QueueError, QueuedMessage, RetryPolicy,
};
use mediaq::domain::{Job, JobRequest};

/// In-memory broker whose publishes fail a set number of times
struct FlakyBroker {
    failures_left: Mutex<u32>,
    declare_error: bool,
    publish_times: Mutex<Vec<Instant>>,
}

impl FlakyBroker {
    fn failing(times: u32) -> Self {
        Self {
            failures_left: Mutex::new(times),
            declare_error: false,
            publish_times: Mutex::new(Vec::new()),
        }
    }

    fn attempts(&self) -> Vec<Instant> {
        self.publish_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    async fn declare(&self, spec: &QueueSpec) -> Result<(), QueueError> {
        if self.declare_error {
            return Err(QueueError::TopologyMismatch {
                queue: spec.name.clone(),
            });
        }
        Ok(())
    }

    async fn publish(&self, _queue: &str, _body: &str, persistent: bool) -> Result<Uuid, QueueError> {
        assert!(persistent, "jobs must be published persistently");
        self.publish_times.lock().unwrap().push(Instant::now());

        let mut failures = self.failures_left.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(QueueError::Unavailable("connection refused".to_string()));
        }
        Ok(Uuid::new_v4())
    }

    async fn fetch(&self, _queue: &str) -> Result<Option<Delivery>, QueueError> {
        Ok(None)
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), QueueError> {
        Ok(())
    }

    async fn reject(&self, _delivery: &Delivery, _requeue: bool) -> Result<(), QueueError> {
        Ok(())
    }

    async fn messages(&self, _queue: &str) -> Result<Vec<QueuedMessage>, QueueError> {
        Ok(Vec::new())
    }

    async fn republish(&self, from: &str, message_id: Uuid, _to: &str) -> Result<Uuid, QueueError> {
        Err(QueueError::MessageNotFound {
            queue: from.to_string(),
            message_id,
        })
    }
}

fn job(id: &str) -> Job {
    JobRequest {
        job_id: Some(id.to_string()),
        source: "/media/lecture.mp4".to_string(),
        languages: vec!["fr".to_string(), "es".to_string()],
        callback_url: "https://example.com/callback".to_string(),
    }
    .validate()
    .unwrap()
}

fn fast_config() -> QueueConfig {
    QueueConfig {
        enqueue_retry: RetryPolicy::immediate(5),
        consume_retry: RetryPolicy::immediate(3),
        poll_interval_ms: 5,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_exhausts_after_five_attempts_with_growing_waits() {
    let broker = Arc::new(FlakyBroker::failing(u32::MAX));
    let queue = JobQueue::new(broker.clone(), QueueConfig::default());

    let err = assert_err!(queue.enqueue(&job("job-1")).await);
    match err {
        QueueError::EnqueueExhausted { attempts, last_error } => {
            assert_eq!(attempts, 5);
            assert!(last_error.contains("connection refused"));
        }
        other => panic!("expected EnqueueExhausted, got {other:?}"),
    }

    let times = broker.attempts();
    assert_eq!(times.len(), 5);

    let waits: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(waits, RetryPolicy::enqueue().schedule());
    assert_eq!(
        waits,
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
            Duration::from_secs(16),
        ]
    );
    assert!(waits.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_recovers_from_transient_failures() {
    let broker = Arc::new(FlakyBroker::failing(2));
    let queue = JobQueue::new(broker.clone(), QueueConfig::default());

    assert_ok!(queue.enqueue(&job("job-1")).await);
    assert_eq!(broker.attempts().len(), 3);
}

#[tokio::test]
async fn test_enqueue_does_not_retry_non_transport_errors() {
    let broker = Arc::new(FlakyBroker {
        declare_error: true,
        ..FlakyBroker::failing(0)
    });
    let queue = JobQueue::new(broker.clone(), fast_config());

    let err = assert_err!(queue.enqueue(&job("job-1")).await);
    assert!(matches!(err, QueueError::TopologyMismatch { .. }));
    assert!(broker.attempts().is_empty());
}

#[tokio::test]
async fn test_persistent_jobs_survive_broker_restart() {
    let temp = TempDir::new().unwrap();

    {
        let broker = Arc::new(FileBroker::open(temp.path()).unwrap());
        let queue = JobQueue::new(broker, fast_config());
        queue.enqueue(&job("durable")).await.unwrap();
    }

    let broker = Arc::new(FileBroker::open(temp.path()).unwrap());
    let queue = JobQueue::new(broker, fast_config());
    let mut consumer = queue.consume();

    let delivery = consumer.try_next().await.unwrap().expect("job survives restart");
    assert_eq!(delivery.job.job_id, "durable");
    assert_eq!(delivery.job.target_languages.len(), 2);
    consumer.ack(delivery).await.unwrap();

    assert!(consumer.try_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_dead_letter_replay_round_trip() {
    let temp = TempDir::new().unwrap();
    let broker = Arc::new(FileBroker::open(temp.path()).unwrap());
    let queue = JobQueue::new(broker, fast_config());

    queue.enqueue(&job("retry-me")).await.unwrap();

    let mut consumer = queue.consume();
    let delivery = consumer.next().await.unwrap();
    consumer.reject(delivery).await.unwrap();

    let status = queue.status().await.unwrap();
    assert_eq!(status.ready, 0);
    assert_eq!(status.dead_lettered, 1);

    let dead = queue.dead_letters().await.unwrap();
    let death = dead[0].death.as_ref().expect("death record");
    assert_eq!(death.queue, "media_jobs");

    queue.replay_dead_letter(dead[0].message_id).await.unwrap();
    assert!(queue.dead_letters().await.unwrap().is_empty());

    let replayed = consumer.next().await.unwrap();
    assert_eq!(replayed.job.job_id, "retry-me");
    consumer.ack(replayed).await.unwrap();
}
