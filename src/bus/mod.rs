//! Order channel.
//!
//! This module contains:
//! - `OrderBus` trait: opens a consuming stream on the orders queue
//! - `OrderStream` trait: pulls one message at a time
//! - `InboundMessage`: a delivery with explicit ack/reject
//! - `OrderPublisher` trait: producer side
//! - Implementations: AMQP (RabbitMQ), in-process channel

use async_trait::async_trait;

use crate::order::Order;

#[cfg(feature = "amqp")]
pub mod amqp;
#[cfg(feature = "channel")]
pub mod channel;

#[cfg(feature = "amqp")]
pub use amqp::AmqpOrderBus;
#[cfg(feature = "channel")]
pub use channel::ChannelOrderBus;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Acknowledgment failed: {0}")]
    Ack(String),

    #[error("Encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Settles a delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Confirm the message; the broker forgets it.
    async fn ack(&self) -> Result<()>;

    /// Refuse the message. `requeue` asks the broker to deliver it again.
    async fn reject(&self, requeue: bool) -> Result<()>;
}

/// A message pulled from the orders queue.
pub struct InboundMessage {
    /// Raw payload.
    pub body: Vec<u8>,
    /// Broker-assigned tag, for logging.
    pub delivery_tag: u64,
    /// Whether the broker delivered this message before.
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl InboundMessage {
    pub fn new(
        body: Vec<u8>,
        delivery_tag: u64,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            body,
            delivery_tag,
            redelivered,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn reject(&self, requeue: bool) -> Result<()> {
        self.acker.reject(requeue).await
    }
}

impl std::fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundMessage")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("len", &self.body.len())
            .finish()
    }
}

/// An open consumer on the orders queue.
#[async_trait]
pub trait OrderStream: Send {
    /// Next delivery. `None` means the broker closed the stream.
    async fn next_message(&mut self) -> Option<Result<InboundMessage>>;

    /// Stop consuming and release the channel.
    async fn close(&mut self) -> Result<()>;
}

/// Source of order messages.
///
/// Implementations:
/// - `AmqpOrderBus`: RabbitMQ via AMQP
/// - `ChannelOrderBus`: in-process queue for standalone mode and tests
#[async_trait]
pub trait OrderBus: Send + Sync {
    /// Connect, ensure the durable queue exists, and start consuming.
    async fn subscribe(&self) -> Result<Box<dyn OrderStream>>;

    /// Queue name, for logging.
    fn queue(&self) -> &str;

    /// Release broker connections.
    fn close(&self) {}
}

/// Producer side of the orders queue.
#[async_trait]
pub trait OrderPublisher: Send + Sync {
    /// Publish one order as a persistent JSON message.
    async fn publish(&self, order: &Order) -> Result<()>;
}
