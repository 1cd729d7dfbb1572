//! AMQP (RabbitMQ) order bus.
//!
//! Orders are published to the default exchange with the queue name as
//! routing key. The queue is durable, shared, and never auto-deleted, so it
//! outlives both producers and consumers.

use async_trait::async_trait;
use backon::Retryable;
use deadpool_lapin::{Manager, Pool, PoolError};
use futures::StreamExt;
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel,
};
use tracing::{debug, info, warn};

use super::{Acknowledger, BusError, InboundMessage, OrderBus, OrderPublisher, OrderStream, Result};
use crate::config::AmqpConfig;
use crate::order::Order;
use crate::utils::retry::publish_backoff;

/// Largest number of pooled broker connections.
const POOL_SIZE: usize = 4;

/// RabbitMQ-backed order bus.
///
/// Creating the bus does not touch the network; connections are opened
/// lazily by [`OrderBus::subscribe`] and [`OrderPublisher::publish`], so
/// callers own the retry policy.
pub struct AmqpOrderBus {
    pool: Pool,
    config: AmqpConfig,
}

impl AmqpOrderBus {
    pub fn new(config: AmqpConfig) -> Result<Self> {
        let url = config
            .connection_url()
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let manager = Manager::new(url, Default::default());
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| BusError::Connection(format!("Failed to create pool: {}", e)))?;

        info!(
            url = %config.redacted_url(),
            queue = %config.queue,
            "AMQP order bus configured"
        );

        Ok(Self { pool, config })
    }

    async fn get_channel(&self) -> Result<Channel> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            BusError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))
    }

    async fn declare_queue(&self, channel: &Channel) -> Result<()> {
        channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to declare queue: {}", e)))?;
        Ok(())
    }

    async fn publish_once(&self, payload: &[u8]) -> Result<()> {
        let channel = self.get_channel().await?;
        self.declare_queue(&channel).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BusError::Publish(format!("Failed to enable confirms: {}", e)))?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2); // persistent

        let confirmation = channel
            .basic_publish(
                "",
                &self.config.queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?
            .await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;

        // Best effort; the message is already confirmed.
        let _ = channel.close(200, "published").await;

        if confirmation.is_nack() {
            return Err(BusError::Publish("Broker refused message".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderBus for AmqpOrderBus {
    async fn subscribe(&self) -> Result<Box<dyn OrderStream>> {
        let channel = self.get_channel().await?;
        self.declare_queue(&channel).await?;

        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to set prefetch: {}", e)))?;

        let consumer_tag = format!("order-ingest-{}", std::process::id());
        let consumer = channel
            .basic_consume(
                &self.config.queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {}", e)))?;

        info!(
            queue = %self.config.queue,
            prefetch = self.config.prefetch,
            "Consuming orders"
        );

        Ok(Box::new(AmqpOrderStream { channel, consumer }))
    }

    fn queue(&self) -> &str {
        &self.config.queue
    }

    fn close(&self) {
        self.pool.close();
    }
}

#[async_trait]
impl OrderPublisher for AmqpOrderBus {
    #[tracing::instrument(name = "order.publish", skip_all, fields(order_id = %order.id))]
    async fn publish(&self, order: &Order) -> Result<()> {
        let payload = order.encode()?;

        (|| async { self.publish_once(&payload).await })
            .retry(publish_backoff())
            .notify(|err: &BusError, dur| {
                warn!(error = %err, retry_in_ms = %dur.as_millis(), "Publish failed, retrying");
            })
            .await?;

        debug!(queue = %self.config.queue, "Published order");
        Ok(())
    }
}

struct AmqpOrderStream {
    channel: Channel,
    consumer: lapin::Consumer,
}

#[async_trait]
impl OrderStream for AmqpOrderStream {
    async fn next_message(&mut self) -> Option<Result<InboundMessage>> {
        let delivery = self.consumer.next().await?;
        Some(
            delivery
                .map(into_inbound)
                .map_err(|e| BusError::Subscribe(format!("Delivery failed: {}", e))),
        )
    }

    async fn close(&mut self) -> Result<()> {
        self.channel
            .close(200, "consumer stopped")
            .await
            .map_err(|e| BusError::Connection(format!("Failed to close channel: {}", e)))
    }
}

fn into_inbound(delivery: Delivery) -> InboundMessage {
    let Delivery {
        delivery_tag,
        redelivered,
        data,
        acker,
        ..
    } = delivery;
    InboundMessage::new(data, delivery_tag, redelivered, Box::new(DeliveryAcker(acker)))
}

struct DeliveryAcker(Acker);

#[async_trait]
impl Acknowledger for DeliveryAcker {
    async fn ack(&self) -> Result<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        self.0
            .reject(BasicRejectOptions { requeue })
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }
}
