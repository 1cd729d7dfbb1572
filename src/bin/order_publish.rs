//! order-publish: put one order on the orders queue
//!
//! Usage:
//! ```text
//! order-publish                       # sample order with a random product id
//! order-publish '{"productId": "...", "quantity": 2, "price": 9.99}'
//! ```
//!
//! A missing `id` is generated. Broker settings come from the same sources as
//! order-consumer (ORDERS_CONFIG, ORDERS__*, RABBITMQ_*).

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use order_ingest::bus::{AmqpOrderBus, OrderBus, OrderPublisher};
use order_ingest::config::Config;
use order_ingest::utils::bootstrap::init_tracing;
use order_ingest::Order;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let order = match std::env::args().nth(1) {
        Some(json) => parse_order(&json)?,
        None => Order::new(Uuid::new_v4(), 1, Decimal::from_str("9.99")?),
    };

    let bus = AmqpOrderBus::new(config.messaging.amqp.clone())?;
    let result = bus.publish(&order).await;
    bus.close();
    result?;

    info!(
        order_id = %order.id,
        product_id = %order.product_id,
        queue = %bus.queue(),
        "Order published"
    );
    println!("{}", order.id);
    Ok(())
}

fn parse_order(json: &str) -> Result<Order, serde_json::Error> {
    let mut value: serde_json::Value = serde_json::from_str(json)?;
    if let Some(fields) = value.as_object_mut() {
        if !fields.contains_key("id") && !fields.contains_key("Id") {
            fields.insert("id".to_string(), Uuid::new_v4().to_string().into());
        }
    }
    serde_json::from_value(value)
}
