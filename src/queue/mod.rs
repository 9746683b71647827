//! Queue client abstraction.
//!
//! The removal engine only sees the [`Delivery`] and [`QueueClient`] traits.
//! `amqp` talks to a real broker through lapin; `memory` is an in-process
//! queue that records every disposition.

pub mod amqp;
pub mod memory;

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::TransportError;

pub use amqp::{AmqpClient, AmqpDelivery};
pub use memory::{DispositionKind, DispositionRecord, MemoryDelivery, MemoryQueue};

/// Broker header table, keyed by header name. Sorted, so serialization is stable.
pub type Headers = BTreeMap<String, HeaderValue>;

/// A broker-neutral header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Void,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal { scale: u8, value: u32 },
    String(String),
    Bytes(Vec<u8>),
    Timestamp(u64),
    Array(Vec<HeaderValue>),
    Table(Headers),
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// One message handed to us by the broker.
///
/// The disposition methods take `self` by value: a delivery can be settled at
/// most once. Dropping it without calling either leaves it unacknowledged.
#[async_trait]
pub trait Delivery: Send + 'static {
    /// Raw payload.
    fn body(&self) -> &[u8];

    /// Header table (empty when the message carried none).
    fn headers(&self) -> &Headers;

    /// Acknowledge, removing the message from the queue.
    async fn ack(self) -> Result<(), TransportError>;

    /// Negative-acknowledge. `requeue = false` discards (or dead-letters),
    /// `requeue = true` returns the message to the queue.
    async fn reject(self, requeue: bool) -> Result<(), TransportError>;
}

/// Stream of deliveries from one consumer. Ends when the channel closes.
pub type DeliveryStream<D> = Pin<Box<dyn Stream<Item = Result<D, TransportError>> + Send>>;

/// The connect / prefetch / consume / close surface of a broker client.
#[async_trait]
pub trait QueueClient: Send + Sync + 'static {
    type Delivery: Delivery;

    /// Open a channel, bound it to `prefetch` unacked deliveries and start a
    /// manual-ack, non-exclusive consumer on `queue`.
    async fn consume(
        &self,
        queue: &str,
        prefetch: u16,
    ) -> Result<DeliveryStream<Self::Delivery>, TransportError>;

    /// Tear down the connection. Any open delivery stream ends afterwards.
    async fn close(&self) -> Result<(), TransportError>;
}
