//! End-to-end pipeline tests: channel bus -> consumer -> mock product service -> SQLite.
//!
//! Run with: cargo test --test pipeline
//!
//! No external services required; the store is an in-memory SQLite database.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use order_ingest::bus::{BusError, ChannelOrderBus, OrderPublisher};
use order_ingest::clients::MockProductOracle;
use order_ingest::config::ConsumerConfig;
use order_ingest::consumer::{AckMode, ConsumerStats, OrderConsumer};
use order_ingest::storage::{OrderStore, SqliteOrderStore};
use order_ingest::validation::OrderValidator;
use order_ingest::Order;

struct Pipeline {
    bus: ChannelOrderBus,
    oracle: Arc<MockProductOracle>,
    store: Arc<SqliteOrderStore>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<ConsumerStats, BusError>>,
}

impl Pipeline {
    async fn start(known_products: &[Uuid], ack_mode: AckMode) -> Self {
        let bus = ChannelOrderBus::new();
        let oracle = Arc::new(MockProductOracle::with_products(known_products).await);
        let store = Arc::new(
            SqliteOrderStore::in_memory()
                .await
                .expect("Failed to open SQLite"),
        );
        store.init().await.expect("Failed to create schema");

        let consumer = OrderConsumer::new(
            Arc::new(bus.clone()),
            OrderValidator::new(oracle.clone(), Duration::from_millis(500)),
            store.clone(),
            ConsumerConfig {
                ack_mode,
                connect_max_retries: 3,
            },
        );

        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { consumer.run(cancel).await })
        };

        Self {
            bus,
            oracle,
            store,
            cancel,
            handle,
        }
    }

    async fn settle(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), self.bus.wait_for_settled(count))
            .await
            .expect("Timed out waiting for messages to settle");
    }

    async fn stop(self) -> ConsumerStats {
        self.cancel.cancel();
        self.handle
            .await
            .expect("Consumer task panicked")
            .expect("Consumer failed")
    }
}

fn price(text: &str) -> Decimal {
    Decimal::from_str(text).unwrap()
}

#[tokio::test]
async fn test_valid_order_is_persisted() {
    let p1 = Uuid::new_v4();
    let pipeline = Pipeline::start(&[p1], AckMode::AfterPersist).await;

    let order = Order::new(p1, 5, price("10.00"));
    pipeline.bus.publish(&order).await.unwrap();
    pipeline.settle(1).await;

    let stored = pipeline.store.list().await.unwrap();
    assert_eq!(stored, vec![order]);
    assert_eq!(stored[0].price.to_string(), "10.00");

    let stats = pipeline.stop().await;
    assert_eq!(stats.persisted, 1);
}

#[tokio::test]
async fn test_unknown_product_is_not_persisted() {
    let pipeline = Pipeline::start(&[Uuid::new_v4()], AckMode::AfterPersist).await;

    let p9 = Uuid::new_v4();
    pipeline
        .bus
        .publish(&Order::new(p9, 1, price("1.00")))
        .await
        .unwrap();
    pipeline.settle(1).await;

    assert!(pipeline.store.list().await.unwrap().is_empty());
    assert_eq!(pipeline.bus.rejected(), 1);

    let stats = pipeline.stop().await;
    assert_eq!(stats.invalid, 1);
}

#[tokio::test]
async fn test_quantity_out_of_range_is_not_persisted() {
    let p1 = Uuid::new_v4();
    let pipeline = Pipeline::start(&[p1], AckMode::AfterPersist).await;

    pipeline
        .bus
        .publish(&Order::new(p1, 2_000_000, price("1.00")))
        .await
        .unwrap();
    pipeline.settle(1).await;

    assert!(pipeline.store.list().await.unwrap().is_empty());
    assert_eq!(pipeline.stop().await.invalid, 1);
}

#[tokio::test]
async fn test_malformed_message_does_not_stop_consumer() {
    let p1 = Uuid::new_v4();
    let pipeline = Pipeline::start(&[p1], AckMode::AfterPersist).await;

    pipeline.bus.publish_raw("{\"productId\": ").unwrap();
    let order = Order::new(p1, 1, price("3.50"));
    pipeline.bus.publish(&order).await.unwrap();
    pipeline.settle(2).await;

    assert_eq!(pipeline.store.list().await.unwrap(), vec![order]);

    let stats = pipeline.stop().await;
    assert_eq!(stats.received, 2);
    assert_eq!(stats.decode_failed, 1);
    assert_eq!(stats.persisted, 1);
}

#[tokio::test]
async fn test_resubmitted_order_is_stored_twice() {
    let p1 = Uuid::new_v4();
    let pipeline = Pipeline::start(&[p1], AckMode::AfterPersist).await;

    let order = Order::new(p1, 1, price("1.00"));
    pipeline.bus.publish(&order).await.unwrap();
    pipeline.bus.publish(&order).await.unwrap();
    pipeline.settle(2).await;

    let stored = pipeline.store.list().await.unwrap();
    assert_eq!(stored, vec![order.clone(), order]);
    pipeline.stop().await;
}

#[tokio::test]
async fn test_price_with_three_decimals_is_rejected() {
    let p1 = Uuid::new_v4();
    let pipeline = Pipeline::start(&[p1], AckMode::AfterPersist).await;

    let body = format!(
        r#"{{"id": "{}", "productId": "{}", "quantity": 1, "price": 1.005}}"#,
        Uuid::new_v4(),
        p1
    );
    pipeline.bus.publish_raw(body).unwrap();
    pipeline.settle(1).await;

    assert!(pipeline.store.list().await.unwrap().is_empty());
    assert_eq!(pipeline.stop().await.invalid, 1);
}

#[tokio::test]
async fn test_pascal_case_producer_is_accepted() {
    let p1 = Uuid::new_v4();
    let pipeline = Pipeline::start(&[p1], AckMode::AfterPersist).await;

    let id = Uuid::new_v4();
    let body = format!(
        r#"{{"Id": "{}", "ProductId": "{}", "Quantity": 4, "Price": 12.50}}"#,
        id, p1
    );
    pipeline.bus.publish_raw(body).unwrap();
    pipeline.settle(1).await;

    let stored = pipeline.store.list().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, id);
    assert_eq!(stored[0].quantity, 4);
    pipeline.stop().await;
}

#[tokio::test]
async fn test_product_service_outage_rejects_orders() {
    let p1 = Uuid::new_v4();
    let pipeline = Pipeline::start(&[p1], AckMode::AfterPersist).await;
    pipeline.oracle.set_unreachable(true).await;

    pipeline
        .bus
        .publish(&Order::new(p1, 1, price("1.00")))
        .await
        .unwrap();
    pipeline.settle(1).await;

    assert!(pipeline.store.list().await.unwrap().is_empty());
    assert_eq!(pipeline.stop().await.invalid, 1);
}

#[tokio::test]
async fn test_slow_product_service_times_out() {
    let p1 = Uuid::new_v4();
    let pipeline = Pipeline::start(&[p1], AckMode::AfterPersist).await;
    pipeline
        .oracle
        .set_delay(Some(Duration::from_secs(2)))
        .await;

    pipeline
        .bus
        .publish(&Order::new(p1, 1, price("1.00")))
        .await
        .unwrap();
    pipeline.settle(1).await;

    assert!(pipeline.store.list().await.unwrap().is_empty());
    assert_eq!(pipeline.stop().await.invalid, 1);
}

#[tokio::test]
async fn test_on_receive_acks_every_message() {
    let p1 = Uuid::new_v4();
    let pipeline = Pipeline::start(&[p1], AckMode::OnReceive).await;

    pipeline.bus.publish_raw("garbage").unwrap();
    pipeline
        .bus
        .publish(&Order::new(Uuid::new_v4(), 1, price("1.00")))
        .await
        .unwrap();
    pipeline.settle(2).await;

    assert_eq!(pipeline.bus.acked(), 2);
    assert_eq!(pipeline.bus.rejected(), 0);

    let stats = pipeline.stop().await;
    assert_eq!(stats.received, 2);
}

#[tokio::test]
async fn test_cancel_returns_stats() {
    let pipeline = Pipeline::start(&[], AckMode::AfterPersist).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = pipeline.stop().await;
    assert_eq!(stats, ConsumerStats::default());
}
