//! lapin-backed AMQP 0-9-1 client.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::config::{CONSUMER_TAG, redact_dsn};
use crate::error::{ConfigError, TransportError};
use crate::queue::{Delivery, DeliveryStream, HeaderValue, Headers, QueueClient};

/// Reply code sent with a normal connection close.
const REPLY_SUCCESS: u16 = 200;

/// A live broker connection.
pub struct AmqpClient {
    connection: Connection,
}

impl AmqpClient {
    /// Dial the broker. Failure is a configuration error: nothing has been
    /// consumed yet.
    pub async fn connect(dsn: &SecretString) -> Result<Self, ConfigError> {
        let redacted = redact_dsn(dsn.expose_secret());
        let connection = Connection::connect(dsn.expose_secret(), ConnectionProperties::default())
            .await
            .map_err(|e| ConfigError::Connect {
                dsn: redacted.clone(),
                reason: e.to_string(),
            })?;

        info!(dsn = %redacted, "Connected to broker");
        Ok(Self { connection })
    }
}

#[async_trait]
impl QueueClient for AmqpClient {
    type Delivery = AmqpDelivery;

    async fn consume(
        &self,
        queue: &str,
        prefetch: u16,
    ) -> Result<DeliveryStream<AmqpDelivery>, TransportError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;

        channel
            .basic_qos(prefetch, BasicQosOptions { global: false })
            .await
            .map_err(|e| TransportError::Prefetch {
                count: prefetch,
                reason: e.to_string(),
            })?;

        let consumer = channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: false,
                    exclusive: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::Consume {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        debug!(queue, prefetch, "Consumer started");

        Ok(Box::pin(ChannelConsumer {
            _channel: channel,
            consumer,
        }))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connection
            .close(REPLY_SUCCESS, "OK")
            .await
            .map_err(|e| TransportError::Close(e.to_string()))
    }
}

/// A consumer bundled with the channel it runs on, so the channel stays open
/// exactly as long as the delivery stream is alive.
struct ChannelConsumer {
    _channel: Channel,
    consumer: Consumer,
}

impl Stream for ChannelConsumer {
    type Item = Result<AmqpDelivery, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.consumer.poll_next_unpin(cx).map(|next| {
            next.map(|item| {
                item.map(AmqpDelivery::from_lapin)
                    .map_err(|e| TransportError::Stream(e.to_string()))
            })
        })
    }
}

/// A delivery received over AMQP, with its headers already converted.
pub struct AmqpDelivery {
    inner: lapin::message::Delivery,
    headers: Headers,
}

impl AmqpDelivery {
    fn from_lapin(inner: lapin::message::Delivery) -> Self {
        let headers = inner
            .properties
            .headers()
            .as_ref()
            .map(convert_table)
            .unwrap_or_default();
        Self { inner, headers }
    }
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.inner.data
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    async fn ack(self) -> Result<(), TransportError> {
        self.inner
            .acker
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(|e| TransportError::Ack(e.to_string()))
    }

    async fn reject(self, requeue: bool) -> Result<(), TransportError> {
        self.inner
            .acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map_err(|e| TransportError::Reject {
                requeue,
                reason: e.to_string(),
            })
    }
}

fn convert_table(table: &FieldTable) -> Headers {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), convert_value(value)))
        .collect()
}

fn convert_value(value: &AMQPValue) -> HeaderValue {
    match value {
        AMQPValue::Boolean(v) => HeaderValue::Bool(*v),
        AMQPValue::ShortShortInt(v) => HeaderValue::Int(i64::from(*v)),
        AMQPValue::ShortShortUInt(v) => HeaderValue::UInt(u64::from(*v)),
        AMQPValue::ShortInt(v) => HeaderValue::Int(i64::from(*v)),
        AMQPValue::ShortUInt(v) => HeaderValue::UInt(u64::from(*v)),
        AMQPValue::LongInt(v) => HeaderValue::Int(i64::from(*v)),
        AMQPValue::LongUInt(v) => HeaderValue::UInt(u64::from(*v)),
        AMQPValue::LongLongInt(v) => HeaderValue::Int(*v),
        AMQPValue::Float(v) => HeaderValue::Float(f64::from(*v)),
        AMQPValue::Double(v) => HeaderValue::Float(*v),
        AMQPValue::DecimalValue(d) => HeaderValue::Decimal {
            scale: d.scale,
            value: d.value,
        },
        AMQPValue::ShortString(s) => HeaderValue::String(s.as_str().to_string()),
        AMQPValue::LongString(s) => {
            HeaderValue::String(String::from_utf8_lossy(s.as_bytes()).into_owned())
        }
        AMQPValue::FieldArray(items) => {
            HeaderValue::Array(items.as_slice().iter().map(convert_value).collect())
        }
        AMQPValue::Timestamp(t) => HeaderValue::Timestamp(*t),
        AMQPValue::FieldTable(t) => HeaderValue::Table(convert_table(t)),
        AMQPValue::ByteArray(b) => HeaderValue::Bytes(b.as_slice().to_vec()),
        AMQPValue::Void => HeaderValue::Void,
    }
}
