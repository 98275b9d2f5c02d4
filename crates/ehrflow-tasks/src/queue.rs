use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;

use ehrflow_core::new_id;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue closed")]
    Closed,

    #[error("Queue internal error: {0}")]
    Internal(String),
}

/// A message taken off the queue. Must be settled with
/// [`MessageQueue::ack`] or [`MessageQueue::nack`].
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub tag: String,
    pub payload: String,
}

/// Broker abstraction: typed enqueue plus receive with
/// acknowledge/redeliver semantics. The broker itself (AMQP, SQS, ...) is an
/// external collaborator; an in-memory implementation is provided for tests
/// and single-process runs.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueues a payload under an explicit type tag.
    async fn send(&self, tag: &str, payload: &str) -> Result<(), QueueError>;

    /// Waits for the next message. Returns [`QueueError::Closed`] once the
    /// queue is shut down and drained of consumers.
    async fn receive(&self) -> Result<ReceivedMessage, QueueError>;

    /// Settles a message as processed.
    async fn ack(&self, message: &ReceivedMessage) -> Result<(), QueueError>;

    /// Returns a message to the queue for redelivery.
    async fn nack(&self, message: &ReceivedMessage) -> Result<(), QueueError>;
}

#[derive(Debug, Default)]
struct QueueInner {
    ready: VecDeque<ReceivedMessage>,
    in_flight: HashMap<String, ReceivedMessage>,
    closed: bool,
}

/// FIFO in-memory broker. `nack` requeues at the front so a redelivered
/// message is retried before newer work.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops delivery; pending receivers unblock with [`QueueError::Closed`].
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Number of messages waiting for delivery. Test observability.
    pub fn depth(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").ready.len()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn send(&self, tag: &str, payload: &str) -> Result<(), QueueError> {
        {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            if inner.closed {
                return Err(QueueError::Closed);
            }
            inner.ready.push_back(ReceivedMessage {
                message_id: new_id(),
                tag: tag.to_string(),
                payload: payload.to_string(),
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self) -> Result<ReceivedMessage, QueueError> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                if let Some(message) = inner.ready.pop_front() {
                    inner
                        .in_flight
                        .insert(message.message_id.clone(), message.clone());
                    return Ok(message);
                }
                if inner.closed {
                    return Err(QueueError::Closed);
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.in_flight.remove(&message.message_id);
        Ok(())
    }

    async fn nack(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            if let Some(message) = inner.in_flight.remove(&message.message_id) {
                inner.ready.push_front(message);
            }
        }
        self.notify.notify_one();
        Ok(())
    }
}
