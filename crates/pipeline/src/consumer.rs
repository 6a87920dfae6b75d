//! Queue consumer trait and the in-memory implementation.
//!
//! Production backends (SQS, Redis) implement [`QueueConsumer`] out of tree;
//! the in-memory queue backs tests and single-process local runs.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("message parse error: {0}")]
    Parse(String),

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("unknown receipt handle: {0}")]
    UnknownReceipt(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// A raw message received from a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique message identifier from the queue provider.
    pub id: String,
    /// Raw message body (JSON string).
    pub body: String,
    /// Provider-specific handle for ack/nack/dead-letter.
    pub receipt_handle: String,
    /// When the message was sent to the queue.
    pub timestamp: DateTime<Utc>,
    /// Number of times this message has been delivered, this one included.
    pub attempt_count: u32,
}

/// Health status of a queue connection.
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub connected: bool,
    pub approximate_message_count: Option<u64>,
    pub provider: String,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueHealth {{ connected: {}, messages: {:?}, provider: {} }}",
            self.connected, self.approximate_message_count, self.provider
        )
    }
}

/// Trait for queue consumer backends.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Poll up to `max_messages`. Returns an empty vec when the queue is
    /// empty; may block up to the provider's long-poll timeout.
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge successful processing — removes the message.
    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Negative-acknowledge — returns the message to the queue for retry.
    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Route the message to the dead-letter destination. Terminal; the
    /// message will not be redelivered.
    async fn dead_letter(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Check queue connectivity.
    async fn health_check(&self) -> Result<QueueHealth, QueueError>;
}

// ── In-memory implementation ────────────────────────────────────────────────

/// Single-process queue with SQS-like delivery counting.
pub struct InMemoryQueue {
    pending: Mutex<VecDeque<QueueMessage>>,
    in_flight: Mutex<HashMap<String, QueueMessage>>,
    dead: Mutex<Vec<QueueMessage>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashMap::new()),
            dead: Mutex::new(Vec::new()),
        }
    }

    /// Enqueue a message body. The id doubles as the receipt handle.
    pub fn push(&self, body: impl Into<String>) {
        let id = Uuid::new_v4().to_string();
        self.pending.lock().unwrap().push_back(QueueMessage {
            receipt_handle: id.clone(),
            id,
            body: body.into(),
            timestamp: Utc::now(),
            attempt_count: 0,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().unwrap().is_empty() && self.in_flight.lock().unwrap().is_empty()
    }

    pub fn dead_letters(&self) -> Vec<QueueMessage> {
        self.dead.lock().unwrap().clone()
    }

    fn take_in_flight(&self, receipt_handle: &str) -> Result<QueueMessage, QueueError> {
        self.in_flight
            .lock()
            .unwrap()
            .remove(receipt_handle)
            .ok_or_else(|| QueueError::UnknownReceipt(receipt_handle.to_string()))
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueConsumer for InMemoryQueue {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let mut pending = self.pending.lock().unwrap();
        let mut in_flight = self.in_flight.lock().unwrap();
        let mut polled = Vec::new();
        while polled.len() < max_messages as usize {
            let Some(mut msg) = pending.pop_front() else {
                break;
            };
            msg.attempt_count += 1;
            in_flight.insert(msg.receipt_handle.clone(), msg.clone());
            polled.push(msg);
        }
        Ok(polled)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.take_in_flight(receipt_handle).map(|_| ())
    }

    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let msg = self.take_in_flight(receipt_handle)?;
        self.pending.lock().unwrap().push_back(msg);
        Ok(())
    }

    async fn dead_letter(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let msg = self.take_in_flight(receipt_handle)?;
        self.dead.lock().unwrap().push(msg);
        Ok(())
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: Some(self.pending.lock().unwrap().len() as u64),
            provider: "memory".to_string(),
        })
    }
}
