//! Order event consumer.
//!
//! One long-lived loop per consumer: pull a message, decode it, validate it
//! against the product service, append it to the store, then settle it with
//! the broker. Exactly one message is in flight at a time.

use std::sync::Arc;

use backon::ExponentialBuilder;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::bus::{BusError, InboundMessage, OrderBus, OrderStream};
use crate::config::ConsumerConfig;
use crate::order::Order;
use crate::storage::{OrderStore, StorageError};
use crate::utils::bootstrap::connect_with_retry;
use crate::utils::retry::{connection_backoff, reconnect_backoff};
use crate::validation::{OrderValidator, ValidationResult};


/// When a message is acknowledged to the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Settle once the outcome is known (at-least-once).
    #[default]
    AfterPersist,
    /// Ack on receipt, before any handling (at-most-once).
    OnReceive,
}

/// Why a single message did not end up in the store.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed order message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Order failed validation: {0}")]
    Validation(ValidationResult),

    #[error("Failed to persist order: {0}")]
    Persistence(#[from] StorageError),
}

/// Kind of permanent rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    Decode,
    Invalid,
}

/// Result of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Persisted,
    Rejected(RejectKind),
    /// The store refused the order.
    Failed,
}

impl From<&PipelineError> for Outcome {
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::Decode(_) => Outcome::Rejected(RejectKind::Decode),
            PipelineError::Validation(_) => Outcome::Rejected(RejectKind::Invalid),
            PipelineError::Persistence(_) => Outcome::Failed,
        }
    }
}

/// Counters collected by [`OrderConsumer::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub persisted: u64,
    pub decode_failed: u64,
    pub invalid: u64,
    pub store_failed: u64,
}

impl ConsumerStats {
    pub fn record(&mut self, outcome: Outcome) {
        self.received += 1;
        match outcome {
            Outcome::Persisted => self.persisted += 1,
            Outcome::Rejected(RejectKind::Decode) => self.decode_failed += 1,
            Outcome::Rejected(RejectKind::Invalid) => self.invalid += 1,
            Outcome::Failed => self.store_failed += 1,
        }
    }
}

/// Drains the orders queue into the order store.
pub struct OrderConsumer {
    bus: Arc<dyn OrderBus>,
    validator: OrderValidator,
    store: Arc<dyn OrderStore>,
    config: ConsumerConfig,
}

impl OrderConsumer {
    pub fn new(
        bus: Arc<dyn OrderBus>,
        validator: OrderValidator,
        store: Arc<dyn OrderStore>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            bus,
            validator,
            store,
            config,
        }
    }

    /// Decode, validate and persist one message body.
    pub async fn ingest(&self, body: &[u8]) -> Result<Order, PipelineError> {
        let order = Order::decode(body)?;

        let span = tracing::Span::current();
        span.record("order_id", tracing::field::display(order.id));
        span.record("product_id", tracing::field::display(order.product_id));

        let result = self.validator.validate(&order).await;
        if !result.is_valid() {
            return Err(PipelineError::Validation(result));
        }

        self.store.append(&order).await?;
        Ok(order)
    }

    /// Handle one delivery and settle it according to the ack mode.
    pub async fn process(&self, message: &InboundMessage) -> Outcome {
        let span = tracing::info_span!(
            "order.consume",
            delivery_tag = message.delivery_tag,
            redelivered = message.redelivered,
            order_id = tracing::field::Empty,
            product_id = tracing::field::Empty,
        );

        async {
            if self.config.ack_mode == AckMode::OnReceive {
                if let Err(e) = message.ack().await {
                    error!(error = %e, "Failed to ack message");
                }
            }

            let outcome = match self.ingest(&message.body).await {
                Ok(order) => {
                    info!(quantity = order.quantity, price = %order.price, "Order persisted");
                    Outcome::Persisted
                }
                Err(e) => {
                    let outcome = Outcome::from(&e);
                    match &e {
                        PipelineError::Decode(_) => warn!(error = %e, "Dropping message"),
                        PipelineError::Validation(result) => {
                            warn!(failures = %result, "Dropping invalid order")
                        }
                        PipelineError::Persistence(_) => error!(error = %e, "Order not stored"),
                    }
                    outcome
                }
            };

            if self.config.ack_mode == AckMode::AfterPersist {
                self.settle(message, outcome).await;
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn settle(&self, message: &InboundMessage, outcome: Outcome) {
        let result = match outcome {
            Outcome::Persisted => message.ack().await,
            Outcome::Rejected(_) => message.reject(false).await,
            Outcome::Failed if !message.redelivered => {
                warn!("Requeueing order for one more attempt");
                message.reject(true).await
            }
            Outcome::Failed => {
                error!("Order failed to store twice, dropping");
                message.reject(false).await
            }
        };
        if let Err(e) = result {
            error!(error = %e, "Failed to settle message");
        }
    }

    /// Consume until `cancel` fires.
    ///
    /// Returns an error only when the broker cannot be reached at startup.
    /// A stream that drops later is reopened with backoff.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ConsumerStats, BusError> {
        let mut stats = ConsumerStats::default();

        let startup = connection_backoff(self.config.connect_max_retries);
        let mut stream = match self.open(startup, &cancel).await? {
            Some(stream) => stream,
            None => return Ok(stats),
        };
        info!(queue = %self.bus.queue(), ack_mode = ?self.config.ack_mode, "Waiting for orders");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = stream.next_message() => next,
            };

            match next {
                Some(Ok(message)) => {
                    let outcome = self.process(&message).await;
                    stats.record(outcome);
                    continue;
                }
                Some(Err(e)) => warn!(error = %e, "Order stream failed, reconnecting"),
                None => warn!("Order stream closed by broker, reconnecting"),
            }

            if let Err(e) = stream.close().await {
                debug!(error = %e, "Closing dropped stream failed");
            }
            stream = match self.open(reconnect_backoff(), &cancel).await? {
                Some(stream) => stream,
                None => return Ok(stats),
            };
        }

        if let Err(e) = stream.close().await {
            warn!(error = %e, "Failed to close order stream");
        }
        info!(?stats, "Consumer stopped");
        Ok(stats)
    }

    /// Subscribe with retries. `None` when cancelled first.
    async fn open(
        &self,
        backoff: ExponentialBuilder,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn OrderStream>>, BusError> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            stream = connect_with_retry("broker", backoff, || self.bus.subscribe()) => stream.map(Some),
        }
    }
}
