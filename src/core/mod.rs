//! Core queueing and processing logic.
//!
//! This module contains:
//! - Broker: Durable file-backed message broker with dead-lettering
//! - JobQueue: Job publishing and single-prefetch consumption
//! - Pipeline: Transcribe, chapter, translate and publish one job
//! - Worker: Pull loop that settles each message after processing
//! - Journal: Append-only job event log

pub mod broker;
pub mod error;
pub mod journal;
pub mod notifier;
pub mod pipeline;
pub mod queue;
pub mod reconcile;
pub mod retry;
pub mod worker;

// Re-export commonly used types
pub use broker::{Broker, FileBroker, QueueError, QueuedMessage};
pub use error::{Classify, Disposition, ErrorKind, StageError};
pub use journal::Journal;
pub use notifier::{CallbackConfig, CallbackNotifier, Notify};
pub use pipeline::{Collaborators, Outcome, Pipeline, TranslationConfig, TranslationPolicy};
pub use queue::{Consumer, JobDelivery, JobQueue, QueueConfig, QueueStatus};
pub use reconcile::reconcile;
pub use retry::{with_backoff, RetryPolicy};
pub use worker::{Worker, WorkerStats};
