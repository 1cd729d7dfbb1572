//! order-consumer: order ingestion service
//!
//! Drains the orders queue, validates every order against the product
//! service and appends accepted orders to the order store.
//!
//! ## Architecture
//! ```text
//! [orders queue] --> [order-consumer] --(GET /api/products/{id})--> [product service]
//!                           |
//!                           v
//!                      [order store]
//! ```
//!
//! ## Configuration
//! - First argument or ORDERS_CONFIG: YAML config file (optional)
//! - ORDERS__*: overrides, e.g. ORDERS__CONSUMER__ACK_MODE=on_receive
//! - RABBITMQ_*, POSTGRES_*, PRODUCT_SERVICE_BASE_URL: legacy deployment variables
//! - ORDERS_LOG: log filter (default: info)
//!
//! With `messaging.type: channel` orders are read as JSON lines from stdin
//! and the service exits once stdin is drained.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use order_ingest::bus::OrderBus;
use order_ingest::clients::HttpProductClient;
use order_ingest::config::{Config, MessagingType};
use order_ingest::consumer::OrderConsumer;
use order_ingest::storage::init_storage;
use order_ingest::utils::bootstrap::init_tracing;
use order_ingest::validation::OrderValidator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let store = init_storage(&config.storage).await?;
    let oracle = Arc::new(HttpProductClient::new(&config.product_service)?);
    let validator = OrderValidator::new(oracle, config.product_service.lookup_timeout());

    let cancel = CancellationToken::new();
    let bus = build_bus(&config, &cancel)?;

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested");
                    cancel.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        });
    }

    info!(
        storage = %config.storage.storage_type,
        product_service = %config.product_service.base_url,
        "order-consumer started"
    );

    let consumer = OrderConsumer::new(bus.clone(), validator, store, config.consumer.clone());
    let result = consumer.run(cancel).await;
    bus.close();

    let stats = result?;
    info!(
        received = stats.received,
        persisted = stats.persisted,
        decode_failed = stats.decode_failed,
        invalid = stats.invalid,
        store_failed = stats.store_failed,
        "order-consumer stopped"
    );
    Ok(())
}

fn build_bus(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Arc<dyn OrderBus>, Box<dyn std::error::Error>> {
    match config.messaging.messaging_type {
        #[cfg(feature = "amqp")]
        MessagingType::Amqp => {
            let bus = order_ingest::bus::AmqpOrderBus::new(config.messaging.amqp.clone())?;
            Ok(Arc::new(bus))
        }
        #[cfg(feature = "channel")]
        MessagingType::Channel => {
            let bus = order_ingest::bus::ChannelOrderBus::new();
            tokio::spawn(feed_stdin(bus.clone(), cancel.clone()));
            Ok(Arc::new(bus))
        }
        #[allow(unreachable_patterns)]
        other => Err(format!("Messaging type {:?} is not enabled in this build", other).into()),
    }
}

/// Publish every stdin line onto the channel bus, then stop the consumer
/// once all of them are settled.
#[cfg(feature = "channel")]
async fn feed_stdin(bus: order_ingest::bus::ChannelOrderBus, cancel: CancellationToken) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut fed = 0usize;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if let Err(e) = bus.publish_raw(line) {
                    error!(error = %e, "Failed to enqueue stdin line");
                    break;
                }
                fed += 1;
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }

    bus.wait_for_settled(fed).await;
    info!(messages = fed, "stdin drained");
    cancel.cancel();
}
