//! Message broker transport behind the job queue.
//!
//! [`Broker`] is the seam between the job queue and whatever actually
//! stores messages. [`FileBroker`] keeps one append-only JSONL log per queue
//! in a directory and derives queue state by replaying it, the same way the
//! job journal works.
//!
//! Guarantees:
//! - Every operation runs under an exclusive lock on `broker.lock`, so any
//!   number of worker processes can share one directory and each message is
//!   handed to at most one consumer at a time.
//! - Each open broker holds a session lease (a locked file under
//!   `sessions/`). A delivery whose session is no longer alive was lost to a
//!   crash and becomes ready again, flagged `redelivered`.
//! - When a broker opens and finds no other live session, the broker is
//!   considered restarted: messages published without the persistent flag
//!   (or on a non-durable queue) are discarded.
//! - Rejecting without requeue on a queue declared with a dead-letter target
//!   moves the message to that queue instead of dropping it.
//! - Once enough messages have settled, a queue log is rewritten to hold
//!   only unsettled messages.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{Classify, ErrorKind};

/// Settled messages a queue log may carry before it is compacted
const COMPACT_AFTER_SETTLED: usize = 64;

/// Errors raised by the broker and the job queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Queue not declared: {0}")]
    UnknownQueue(String),

    #[error("Invalid queue name: '{0}'")]
    InvalidQueueName(String),

    #[error("Queue '{queue}' already declared with different arguments")]
    TopologyMismatch { queue: String },

    #[error("Unknown or already settled delivery: {0}")]
    UnknownDelivery(Uuid),

    #[error("Message not found in '{queue}': {message_id}")]
    MessageNotFound { queue: String, message_id: Uuid },

    #[error("Previous delivery has not been acknowledged or rejected")]
    PrefetchExceeded,

    #[error("Failed to enqueue job after {attempts} attempts: {last_error}")]
    EnqueueExhausted { attempts: u32, last_error: String },
}

impl Classify for QueueError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Unavailable(_) | Self::EnqueueExhausted { .. } => {
                ErrorKind::Transport
            }
            Self::Serialization(_)
            | Self::UnknownQueue(_)
            | Self::InvalidQueueName(_)
            | Self::TopologyMismatch { .. }
            | Self::UnknownDelivery(_)
            | Self::MessageNotFound { .. }
            | Self::PrefetchExceeded => ErrorKind::Fatal,
        }
    }
}

/// Declaration of a queue and its dead-letter routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,

    /// Whether the queue (and its persistent messages) survives a restart
    pub durable: bool,

    /// Queue that receives messages rejected without requeue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter: Option<String>,
}

impl QueueSpec {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            dead_letter: None,
        }
    }

    pub fn with_dead_letter(mut self, queue: impl Into<String>) -> Self {
        self.dead_letter = Some(queue.into());
        self
    }
}

/// Why and where a message was dead-lettered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathRecord {
    /// Queue the message was rejected from
    pub queue: String,
    pub reason: String,
    pub time: DateTime<Utc>,
    /// How many times this body has been dead-lettered
    pub count: u32,
}

/// A message handed to a consumer; settle it with ack or reject
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Identifies this particular hand-off
    pub tag: Uuid,
    pub message_id: Uuid,
    pub queue: String,
    pub body: String,
    /// Delivered before without being settled
    pub redelivered: bool,
    pub death: Option<DeathRecord>,
}

/// Snapshot of an unsettled message, for inspection
#[derive(Debug, Clone, Serialize)]
pub struct QueuedMessage {
    pub message_id: Uuid,
    pub published_at: DateTime<Utc>,
    pub body: String,
    pub persistent: bool,
    /// Currently held by a live consumer
    pub in_flight: bool,
    pub delivery_count: u32,
    pub death: Option<DeathRecord>,
}

/// Transport operations the job queue relies on
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a queue (idempotent for identical arguments)
    async fn declare(&self, spec: &QueueSpec) -> Result<(), QueueError>;

    /// Publish a message; returns its id
    async fn publish(&self, queue: &str, body: &str, persistent: bool) -> Result<Uuid, QueueError>;

    /// Take the oldest ready message, if any
    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>, QueueError>;

    /// Settle a delivery as processed; the message is removed
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Settle a delivery as failed; without requeue it is dead-lettered
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;

    /// Unsettled messages in publication order
    async fn messages(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueError>;

    /// Move a ready message from one queue to another; returns the new id
    async fn republish(&self, from: &str, message_id: Uuid, to: &str) -> Result<Uuid, QueueError>;
}

/// One line of a queue log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogRecord {
    Published {
        message_id: Uuid,
        timestamp: DateTime<Utc>,
        session: Uuid,
        persistent: bool,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        death: Option<DeathRecord>,
        /// Deliveries carried over from before a compaction
        #[serde(default, skip_serializing_if = "is_zero")]
        deliveries: u32,
    },
    Delivered {
        message_id: Uuid,
        tag: Uuid,
        session: Uuid,
        timestamp: DateTime<Utc>,
    },
    Acked {
        message_id: Uuid,
        tag: Uuid,
        timestamp: DateTime<Utc>,
    },
    Rejected {
        message_id: Uuid,
        tag: Uuid,
        requeue: bool,
        timestamp: DateTime<Utc>,
    },
    Purged {
        message_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageStatus {
    Ready,
    Unacked { tag: Uuid, session: Uuid },
    Settled,
}

#[derive(Debug, Clone)]
struct MessageState {
    message_id: Uuid,
    published_at: DateTime<Utc>,
    published_by: Uuid,
    persistent: bool,
    body: String,
    death: Option<DeathRecord>,
    status: MessageStatus,
    delivery_count: u32,
}

/// Queue state derived from replaying its log
#[derive(Debug, Default)]
struct QueueState {
    messages: Vec<MessageState>,
    index: HashMap<Uuid, usize>,
}

impl QueueState {
    fn apply(&mut self, record: LogRecord) {
        match record {
            LogRecord::Published {
                message_id,
                timestamp,
                session,
                persistent,
                body,
                death,
                deliveries,
            } => {
                self.index.insert(message_id, self.messages.len());
                self.messages.push(MessageState {
                    message_id,
                    published_at: timestamp,
                    published_by: session,
                    persistent,
                    body,
                    death,
                    status: MessageStatus::Ready,
                    delivery_count: deliveries,
                });
            }
            LogRecord::Delivered {
                message_id,
                tag,
                session,
                ..
            } => {
                if let Some(msg) = self.get_mut(&message_id) {
                    msg.status = MessageStatus::Unacked { tag, session };
                    msg.delivery_count += 1;
                }
            }
            LogRecord::Acked {
                message_id, tag, ..
            } => {
                if let Some(msg) = self.get_mut(&message_id) {
                    if matches!(msg.status, MessageStatus::Unacked { tag: t, .. } if t == tag) {
                        msg.status = MessageStatus::Settled;
                    }
                }
            }
            LogRecord::Rejected {
                message_id,
                tag,
                requeue,
                ..
            } => {
                if let Some(msg) = self.get_mut(&message_id) {
                    if matches!(msg.status, MessageStatus::Unacked { tag: t, .. } if t == tag) {
                        msg.status = if requeue {
                            MessageStatus::Ready
                        } else {
                            MessageStatus::Settled
                        };
                    }
                }
            }
            LogRecord::Purged { message_id, .. } => {
                if let Some(msg) = self.get_mut(&message_id) {
                    msg.status = MessageStatus::Settled;
                }
            }
        }
    }

    fn settled(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.status == MessageStatus::Settled)
            .count()
    }

    fn get(&self, id: &Uuid) -> Option<&MessageState> {
        self.index.get(id).map(|&i| &self.messages[i])
    }

    fn get_mut(&mut self, id: &Uuid) -> Option<&mut MessageState> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.messages[i]),
            None => None,
        }
    }
}

/// File-backed broker (see module docs)
#[derive(Clone)]
pub struct FileBroker {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    session: Uuid,
    /// Held for the broker's lifetime; releasing it marks the session dead
    _lease: File,
    specs: Mutex<HashMap<String, QueueSpec>>,
}

impl FileBroker {
    /// Open (or create) a broker directory and start a new session
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let root = root.into();
        let sessions_dir = root.join("sessions");
        fs::create_dir_all(&sessions_dir)?;

        // Peers only reap leases under the directory lock, so ours must be
        // locked before that lock is released
        let guard = lock_dir(&root)?;

        let session = Uuid::new_v4();
        let lease = OpenOptions::new()
            .create(true)
            .write(true)
            .open(sessions_dir.join(format!("{}.lock", session)))?;
        lease.lock_exclusive()?;

        let inner = Inner {
            root,
            session,
            _lease: lease,
            specs: Mutex::new(HashMap::new()),
        };

        let live_peers = inner.reap_sessions()?;
        if live_peers == 0 {
            inner.discard_transient()?;
        }
        drop(guard);

        info!(root = %inner.root.display(), %session, "Broker opened");

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Directory holding the queue logs
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// This broker's session id
    pub fn session(&self) -> Uuid {
        self.inner.session
    }

    /// Run a synchronous broker operation off the async runtime
    async fn blocking<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, QueueError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let _guard = inner.lock()?;
            f(inner.as_ref())
        })
        .await
        .map_err(|e| QueueError::Unavailable(format!("broker task failed: {}", e)))?
    }
}

/// Take the exclusive lock every broker operation runs under
fn lock_dir(root: &Path) -> Result<File, QueueError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(root.join("broker.lock"))?;
    file.lock_exclusive()?;
    Ok(file)
}

fn write_record(file: &mut File, record: &LogRecord) -> Result<(), QueueError> {
    let json = serde_json::to_string(record)?;
    file.write_all(format!("{}\n", json).as_bytes())?;
    Ok(())
}

impl Inner {
    fn lock(&self) -> Result<File, QueueError> {
        lock_dir(&self.root)
    }

    fn log_path(&self, queue: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", queue))
    }

    fn spec_path(&self, queue: &str) -> PathBuf {
        self.root.join(format!("{}.queue.json", queue))
    }

    fn validate_name(queue: &str) -> Result<(), QueueError> {
        let valid = !queue.is_empty()
            && !queue.starts_with('.')
            && queue
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if valid {
            Ok(())
        } else {
            Err(QueueError::InvalidQueueName(queue.to_string()))
        }
    }

    /// Look up a queue's declaration, falling back to the persisted one
    fn spec(&self, queue: &str) -> Result<QueueSpec, QueueError> {
        Self::validate_name(queue)?;

        if let Some(spec) = self.specs.lock().map_err(poisoned)?.get(queue) {
            return Ok(spec.clone());
        }

        let path = self.spec_path(queue);
        if !path.exists() {
            return Err(QueueError::UnknownQueue(queue.to_string()));
        }
        let spec: QueueSpec = serde_json::from_str(&fs::read_to_string(path)?)?;
        self.specs
            .lock()
            .map_err(poisoned)?
            .insert(queue.to_string(), spec.clone());
        Ok(spec)
    }

    fn declare(&self, spec: &QueueSpec) -> Result<(), QueueError> {
        Self::validate_name(&spec.name)?;

        let path = self.spec_path(&spec.name);
        if path.exists() {
            let existing: QueueSpec = serde_json::from_str(&fs::read_to_string(&path)?)?;
            if existing != *spec {
                return Err(QueueError::TopologyMismatch {
                    queue: spec.name.clone(),
                });
            }
        } else {
            fs::write(&path, serde_json::to_string_pretty(spec)?)?;
            debug!(queue = %spec.name, dead_letter = ?spec.dead_letter, "Queue declared");
        }

        self.specs
            .lock()
            .map_err(poisoned)?
            .insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn append(&self, queue: &str, record: &LogRecord) -> Result<(), QueueError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(queue))?;

        write_record(&mut file, record)?;
        file.sync_data()?;

        Ok(())
    }

    /// Rewrite a queue log so it holds only unsettled messages.
    ///
    /// In-flight messages keep their delivery record so the holder can
    /// still settle them.
    fn compact(&self, queue: &str) -> Result<(), QueueError> {
        let path = self.log_path(queue);
        if !path.exists() {
            return Ok(());
        }

        let state = self.replay(queue)?;
        let staging = self.root.join(format!("{}.jsonl.compact", queue));
        let mut file = File::create(&staging)?;
        let mut kept = 0;

        for msg in state.messages.iter().filter(|m| m.status != MessageStatus::Settled) {
            let held = match msg.status {
                MessageStatus::Unacked { tag, session } => Some((tag, session)),
                _ => None,
            };

            write_record(
                &mut file,
                &LogRecord::Published {
                    message_id: msg.message_id,
                    timestamp: msg.published_at,
                    session: msg.published_by,
                    persistent: msg.persistent,
                    body: msg.body.clone(),
                    death: msg.death.clone(),
                    deliveries: msg.delivery_count.saturating_sub(u32::from(held.is_some())),
                },
            )?;
            if let Some((tag, session)) = held {
                write_record(
                    &mut file,
                    &LogRecord::Delivered {
                        message_id: msg.message_id,
                        tag,
                        session,
                        timestamp: Utc::now(),
                    },
                )?;
            }
            kept += 1;
        }

        file.sync_all()?;
        drop(file);
        fs::rename(&staging, &path)?;

        debug!(queue, kept, dropped = state.messages.len() - kept, "Queue log compacted");
        Ok(())
    }

    /// Compact once `settled` messages have piled up; failures only cost disk
    fn compact_if_due(&self, queue: &str, settled: usize) {
        if settled < COMPACT_AFTER_SETTLED {
            return;
        }
        if let Err(e) = self.compact(queue) {
            warn!(queue, error = %e, "Queue log compaction failed");
        }
    }

    fn replay(&self, queue: &str) -> Result<QueueState, QueueError> {
        let mut state = QueueState::default();
        let path = self.log_path(queue);

        if !path.exists() {
            return Ok(state);
        }

        let reader = BufReader::new(File::open(&path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(&line) {
                Ok(record) => state.apply(record),
                // A torn final line from a crash mid-write
                Err(e) => warn!(queue, error = %e, "Skipping unreadable queue record"),
            }
        }

        Ok(state)
    }

    fn session_alive(&self, session: Uuid) -> Result<bool, QueueError> {
        if session == self.session {
            return Ok(true);
        }

        let path = self.root.join("sessions").join(format!("{}.lock", session));
        if !path.exists() {
            return Ok(false);
        }

        let file = OpenOptions::new().write(true).open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                file.unlock()?;
                Ok(false)
            }
            Err(_) => Ok(true),
        }
    }

    /// Remove lease files of dead sessions; returns how many peers are alive
    fn reap_sessions(&self) -> Result<usize, QueueError> {
        let mut live = 0;

        for entry in fs::read_dir(self.root.join("sessions"))? {
            let path = entry?.path();
            let Some(session) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };

            if session == self.session {
                continue;
            }
            if self.session_alive(session)? {
                live += 1;
            } else {
                fs::remove_file(&path)?;
            }
        }

        Ok(live)
    }

    /// Drop messages that do not survive a broker restart
    fn discard_transient(&self) -> Result<(), QueueError> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let Some(queue) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".jsonl"))
            else {
                continue;
            };

            let durable = self.spec(queue).map(|s| s.durable).unwrap_or(false);
            let state = self.replay(queue)?;
            for msg in &state.messages {
                if msg.status != MessageStatus::Settled && !(durable && msg.persistent) {
                    info!(queue, message_id = %msg.message_id, "Discarding transient message after restart");
                    self.append(
                        queue,
                        &LogRecord::Purged {
                            message_id: msg.message_id,
                            timestamp: Utc::now(),
                        },
                    )?;
                }
            }
        }

        Ok(())
    }

    /// Status as seen by this session: orphaned deliveries count as ready
    fn effective_status(&self, msg: &MessageState) -> Result<MessageStatus, QueueError> {
        match msg.status {
            MessageStatus::Unacked { session, .. } if !self.session_alive(session)? => {
                Ok(MessageStatus::Ready)
            }
            status => Ok(status),
        }
    }

    fn publish(
        &self,
        queue: &str,
        body: &str,
        persistent: bool,
        death: Option<DeathRecord>,
    ) -> Result<Uuid, QueueError> {
        self.spec(queue)?;

        let message_id = Uuid::new_v4();
        self.append(
            queue,
            &LogRecord::Published {
                message_id,
                timestamp: Utc::now(),
                session: self.session,
                persistent,
                body: body.to_string(),
                death,
                deliveries: 0,
            },
        )?;

        Ok(message_id)
    }

    fn fetch(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        self.spec(queue)?;
        let state = self.replay(queue)?;

        for msg in &state.messages {
            if self.effective_status(msg)? != MessageStatus::Ready {
                continue;
            }

            let tag = Uuid::new_v4();
            self.append(
                queue,
                &LogRecord::Delivered {
                    message_id: msg.message_id,
                    tag,
                    session: self.session,
                    timestamp: Utc::now(),
                },
            )?;

            return Ok(Some(Delivery {
                tag,
                message_id: msg.message_id,
                queue: queue.to_string(),
                body: msg.body.clone(),
                redelivered: msg.delivery_count > 0,
                death: msg.death.clone(),
            }));
        }

        Ok(None)
    }

    /// Check that `delivery` is still held by this session
    fn held<'a>(&self, state: &'a QueueState, delivery: &Delivery) -> Result<&'a MessageState, QueueError> {
        match state.get(&delivery.message_id) {
            Some(msg)
                if msg.status
                    == (MessageStatus::Unacked {
                        tag: delivery.tag,
                        session: self.session,
                    }) =>
            {
                Ok(msg)
            }
            _ => Err(QueueError::UnknownDelivery(delivery.tag)),
        }
    }

    fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let state = self.replay(&delivery.queue)?;
        self.held(&state, delivery)?;

        self.append(
            &delivery.queue,
            &LogRecord::Acked {
                message_id: delivery.message_id,
                tag: delivery.tag,
                timestamp: Utc::now(),
            },
        )?;

        self.compact_if_due(&delivery.queue, state.settled() + 1);
        Ok(())
    }

    fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        let spec = self.spec(&delivery.queue)?;
        let state = self.replay(&delivery.queue)?;
        let msg = self.held(&state, delivery)?;

        if !requeue {
            match &spec.dead_letter {
                Some(dead_letter) => {
                    let death = DeathRecord {
                        queue: delivery.queue.clone(),
                        reason: "rejected".to_string(),
                        time: Utc::now(),
                        count: msg.death.as_ref().map(|d| d.count + 1).unwrap_or(1),
                    };
                    let dead_id = self.publish(dead_letter, &msg.body, true, Some(death))?;
                    info!(
                        queue = %delivery.queue,
                        dead_letter = %dead_letter,
                        message_id = %delivery.message_id,
                        %dead_id,
                        "Message dead-lettered"
                    );
                }
                None => {
                    warn!(
                        queue = %delivery.queue,
                        message_id = %delivery.message_id,
                        "Rejected message dropped (no dead-letter queue)"
                    );
                }
            }
        }

        self.append(
            &delivery.queue,
            &LogRecord::Rejected {
                message_id: delivery.message_id,
                tag: delivery.tag,
                requeue,
                timestamp: Utc::now(),
            },
        )?;

        self.compact_if_due(&delivery.queue, state.settled() + usize::from(!requeue));
        Ok(())
    }

    fn messages(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueError> {
        self.spec(queue)?;
        let state = self.replay(queue)?;

        let mut out = Vec::new();
        for msg in &state.messages {
            let status = self.effective_status(msg)?;
            if status == MessageStatus::Settled {
                continue;
            }
            out.push(QueuedMessage {
                message_id: msg.message_id,
                published_at: msg.published_at,
                body: msg.body.clone(),
                persistent: msg.persistent,
                in_flight: matches!(status, MessageStatus::Unacked { .. }),
                delivery_count: msg.delivery_count,
                death: msg.death.clone(),
            });
        }

        Ok(out)
    }

    fn republish(&self, from: &str, message_id: Uuid, to: &str) -> Result<Uuid, QueueError> {
        let state = self.replay(from)?;
        let not_found = || QueueError::MessageNotFound {
            queue: from.to_string(),
            message_id,
        };

        let msg = state.get(&message_id).ok_or_else(not_found)?;
        if self.effective_status(msg)? != MessageStatus::Ready {
            return Err(not_found());
        }

        let new_id = self.publish(to, &msg.body, true, msg.death.clone())?;
        self.append(
            from,
            &LogRecord::Purged {
                message_id,
                timestamp: Utc::now(),
            },
        )?;

        Ok(new_id)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> QueueError {
    QueueError::Unavailable("queue spec registry poisoned".to_string())
}

#[async_trait]
impl Broker for FileBroker {
    async fn declare(&self, spec: &QueueSpec) -> Result<(), QueueError> {
        let spec = spec.clone();
        self.blocking(move |inner| inner.declare(&spec)).await
    }

    async fn publish(&self, queue: &str, body: &str, persistent: bool) -> Result<Uuid, QueueError> {
        let (queue, body) = (queue.to_string(), body.to_string());
        self.blocking(move |inner| inner.publish(&queue, &body, persistent, None))
            .await
    }

    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        let queue = queue.to_string();
        self.blocking(move |inner| inner.fetch(&queue)).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let delivery = delivery.clone();
        self.blocking(move |inner| inner.ack(&delivery)).await
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        let delivery = delivery.clone();
        self.blocking(move |inner| inner.reject(&delivery, requeue))
            .await
    }

    async fn messages(&self, queue: &str) -> Result<Vec<QueuedMessage>, QueueError> {
        let queue = queue.to_string();
        self.blocking(move |inner| inner.messages(&queue)).await
    }

    async fn republish(&self, from: &str, message_id: Uuid, to: &str) -> Result<Uuid, QueueError> {
        let (from, to) = (from.to_string(), to.to_string());
        self.blocking(move |inner| inner.republish(&from, message_id, &to))
            .await
    }
}
