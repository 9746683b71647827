//! In-process queue with broker-like prefetch and requeue semantics.
//!
//! Dispatches at most `prefetch` unacknowledged deliveries at a time,
//! redelivers requeued messages, and returns unacknowledged messages to the
//! ready list when closed. Every disposition is recorded for inspection.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::error::TransportError;
use crate::queue::{Delivery, DeliveryStream, Headers, QueueClient};

/// What happened to a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispositionKind {
    Acked,
    Discarded,
    Requeued,
}

impl DispositionKind {
    /// The transport error a failed call of this kind reports.
    fn failure(self, reason: String) -> TransportError {
        match self {
            Self::Acked => TransportError::Ack(reason),
            Self::Discarded => TransportError::Reject {
                requeue: false,
                reason,
            },
            Self::Requeued => TransportError::Reject {
                requeue: true,
                reason,
            },
        }
    }
}

/// One disposition call observed by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispositionRecord {
    /// Sequence number assigned at publish time.
    pub message_id: u64,
    pub kind: DispositionKind,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    body: Vec<u8>,
    headers: Headers,
}

#[derive(Default)]
struct State {
    ready: VecDeque<StoredMessage>,
    unacked: Vec<StoredMessage>,
    prefetch: usize,
    next_id: u64,
    closed: bool,
    records: Vec<DispositionRecord>,
}

struct Shared {
    name: String,
    state: Mutex<State>,
    notify: Notify,
}

/// A named in-memory queue. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Enqueue a message. Returns its sequence number.
    pub async fn publish(&self, body: impl Into<Vec<u8>>, headers: Headers) -> u64 {
        let mut state = self.shared.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.ready.push_back(StoredMessage {
            id,
            body: body.into(),
            headers,
        });
        drop(state);
        self.shared.notify.notify_waiters();
        id
    }

    /// All disposition calls so far, in the order they arrived.
    pub async fn records(&self) -> Vec<DispositionRecord> {
        self.shared.state.lock().await.records.clone()
    }

    /// Messages waiting to be dispatched.
    pub async fn ready_len(&self) -> usize {
        self.shared.state.lock().await.ready.len()
    }

    /// Messages dispatched and not yet settled.
    pub async fn unacked_len(&self) -> usize {
        self.shared.state.lock().await.unacked.len()
    }

    async fn next_delivery(shared: Arc<Shared>) -> Option<MemoryDelivery> {
        loop {
            let notified = shared.notify.notified();
            {
                let mut state = shared.state.lock().await;
                if state.closed {
                    return None;
                }
                if state.unacked.len() < state.prefetch {
                    if let Some(message) = state.ready.pop_front() {
                        state.unacked.push(message.clone());
                        return Some(MemoryDelivery {
                            shared: Arc::clone(&shared),
                            id: message.id,
                            body: message.body,
                            headers: message.headers,
                        });
                    }
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    type Delivery = MemoryDelivery;

    async fn consume(
        &self,
        queue: &str,
        prefetch: u16,
    ) -> Result<DeliveryStream<MemoryDelivery>, TransportError> {
        if queue != self.shared.name {
            return Err(TransportError::Consume {
                queue: queue.to_string(),
                reason: format!("NOT_FOUND - no queue '{queue}'"),
            });
        }

        {
            let mut state = self.shared.state.lock().await;
            if state.closed {
                return Err(TransportError::Channel("connection closed".into()));
            }
            state.prefetch = usize::from(prefetch);
        }

        let shared = Arc::clone(&self.shared);
        let deliveries = stream::unfold(shared, |shared| async move {
            let delivery = MemoryQueue::next_delivery(Arc::clone(&shared)).await?;
            Some((Ok::<_, TransportError>(delivery), shared))
        });
        Ok(Box::pin(deliveries))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock().await;
        state.closed = true;
        // Unsettled messages go back to the front, as a broker does on connection loss.
        let returned: Vec<_> = state.unacked.drain(..).collect();
        for message in returned.into_iter().rev() {
            state.ready.push_front(message);
        }
        drop(state);
        debug!(queue = %self.shared.name, "Memory queue closed");
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

/// A delivery from a [`MemoryQueue`].
pub struct MemoryDelivery {
    shared: Arc<Shared>,
    id: u64,
    body: Vec<u8>,
    headers: Headers,
}

impl MemoryDelivery {
    /// Sequence number assigned at publish time.
    pub fn message_id(&self) -> u64 {
        self.id
    }

    async fn settle(self, kind: DispositionKind) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock().await;
        if state.closed {
            return Err(kind.failure("connection closed".to_string()));
        }

        let Some(pos) = state.unacked.iter().position(|m| m.id == self.id) else {
            return Err(kind.failure(format!(
                "PRECONDITION_FAILED - unknown delivery {}",
                self.id
            )));
        };
        let message = state.unacked.remove(pos);
        if kind == DispositionKind::Requeued {
            state.ready.push_back(message);
        }
        state.records.push(DispositionRecord {
            message_id: self.id,
            kind,
        });
        drop(state);
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    async fn ack(self) -> Result<(), TransportError> {
        self.settle(DispositionKind::Acked).await
    }

    async fn reject(self, requeue: bool) -> Result<(), TransportError> {
        let kind = if requeue {
            DispositionKind::Requeued
        } else {
            DispositionKind::Discarded
        };
        self.settle(kind).await
    }
}
