//! In-process order bus for standalone mode and tests.
//!
//! A single unbounded queue shared by every stream, so concurrent consumers
//! compete for messages the way they do on a RabbitMQ queue. Rejected
//! messages with `requeue` go back on the queue flagged as redelivered.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info};

use super::{Acknowledger, BusError, InboundMessage, OrderBus, OrderPublisher, OrderStream, Result};
use crate::order::Order;

/// Queue name reported for logging.
const CHANNEL_QUEUE: &str = "orders";

struct Envelope {
    body: Vec<u8>,
    redelivered: bool,
}

struct Shared {
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    next_tag: AtomicU64,
    acked: AtomicUsize,
    rejected: AtomicUsize,
    requeued: AtomicUsize,
    /// Number of ack/reject calls so far.
    settled: watch::Sender<usize>,
    /// Bumped by `disconnect`; streams opened under an older value end.
    generation: watch::Sender<u64>,
    failing_subscribes: AtomicUsize,
}

/// In-memory order bus.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct ChannelOrderBus {
    shared: Arc<Shared>,
}

impl Default for ChannelOrderBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelOrderBus {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (settled, _) = watch::channel(0);
        let (generation, _) = watch::channel(0);

        info!("Channel order bus initialized");

        Self {
            shared: Arc::new(Shared {
                sender,
                receiver: Mutex::new(receiver),
                next_tag: AtomicU64::new(1),
                acked: AtomicUsize::new(0),
                rejected: AtomicUsize::new(0),
                requeued: AtomicUsize::new(0),
                settled,
                generation,
                failing_subscribes: AtomicUsize::new(0),
            }),
        }
    }

    /// Enqueue a raw message body, bypassing encoding.
    pub fn publish_raw(&self, body: impl Into<Vec<u8>>) -> Result<()> {
        self.shared
            .sender
            .send(Envelope {
                body: body.into(),
                redelivered: false,
            })
            .map_err(|_| BusError::Publish("Channel closed".to_string()))
    }

    /// Messages acknowledged so far.
    pub fn acked(&self) -> usize {
        self.shared.acked.load(Ordering::SeqCst)
    }

    /// Messages rejected without requeue so far.
    pub fn rejected(&self) -> usize {
        self.shared.rejected.load(Ordering::SeqCst)
    }

    /// Messages rejected with requeue so far.
    pub fn requeued(&self) -> usize {
        self.shared.requeued.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` ack/reject calls have happened.
    pub async fn wait_for_settled(&self, count: usize) {
        let mut rx = self.shared.settled.subscribe();
        // The sender lives in `shared`, so the channel cannot close here.
        let _ = rx.wait_for(|settled| *settled >= count).await;
    }

    /// End every open stream, as if the broker dropped the connection.
    pub fn disconnect(&self) {
        self.shared.generation.send_modify(|g| *g += 1);
    }

    /// Make the next `count` subscribe attempts fail with a connection error.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.shared.failing_subscribes.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderBus for ChannelOrderBus {
    async fn subscribe(&self) -> Result<Box<dyn OrderStream>> {
        let failing = &self.shared.failing_subscribes;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BusError::Connection("Channel bus unavailable".to_string()));
        }

        let generation = self.shared.generation.subscribe();
        let opened_at = *generation.borrow();
        debug!(generation = opened_at, "Channel stream opened");

        Ok(Box::new(ChannelOrderStream {
            shared: Arc::clone(&self.shared),
            generation,
            opened_at,
        }))
    }

    fn queue(&self) -> &str {
        CHANNEL_QUEUE
    }
}

#[async_trait]
impl OrderPublisher for ChannelOrderBus {
    async fn publish(&self, order: &Order) -> Result<()> {
        self.publish_raw(order.encode()?)
    }
}

struct ChannelOrderStream {
    shared: Arc<Shared>,
    generation: watch::Receiver<u64>,
    opened_at: u64,
}

#[async_trait]
impl OrderStream for ChannelOrderStream {
    async fn next_message(&mut self) -> Option<Result<InboundMessage>> {
        if *self.generation.borrow() != self.opened_at {
            return None;
        }

        // Another stream may hold the receiver; a disconnect must still end this one.
        let envelope = {
            let mut receiver = tokio::select! {
                receiver = self.shared.receiver.lock() => receiver,
                _ = self.generation.changed() => return None,
            };
            tokio::select! {
                envelope = receiver.recv() => envelope,
                _ = self.generation.changed() => None,
            }
        }?;

        let delivery_tag = self.shared.next_tag.fetch_add(1, Ordering::SeqCst);
        let acker = ChannelAcker {
            shared: Arc::clone(&self.shared),
            body: envelope.body.clone(),
            done: AtomicBool::new(false),
        };
        Some(Ok(InboundMessage::new(
            envelope.body,
            delivery_tag,
            envelope.redelivered,
            Box::new(acker),
        )))
    }

    async fn close(&mut self) -> Result<()> {
        debug!(generation = self.opened_at, "Channel stream closed");
        Ok(())
    }
}

struct ChannelAcker {
    shared: Arc<Shared>,
    body: Vec<u8>,
    done: AtomicBool,
}

impl ChannelAcker {
    fn settle(&self, counter: &AtomicUsize) -> Result<()> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Err(BusError::Ack("Delivery already settled".to_string()));
        }
        counter.fetch_add(1, Ordering::SeqCst);
        self.shared.settled.send_modify(|n| *n += 1);
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for ChannelAcker {
    async fn ack(&self) -> Result<()> {
        self.settle(&self.shared.acked)
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        if !requeue {
            return self.settle(&self.shared.rejected);
        }
        self.settle(&self.shared.requeued)?;
        self.shared
            .sender
            .send(Envelope {
                body: self.body.clone(),
                redelivered: true,
            })
            .map_err(|_| BusError::Ack("Channel closed".to_string()))
    }
}
