//! Shared storage helper functions.
//!
//! Row decoding shared by the SQL backends, which read every column back as
//! text or integer.

use std::str::FromStr;

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Result, StorageError};
use crate::order::Order;

/// Rebuild an order from its stored columns.
pub fn order_from_columns(id: &str, product_id: &str, quantity: i64, price: &str) -> Result<Order> {
    let quantity = u32::try_from(quantity)
        .map_err(|_| StorageError::Corrupt(format!("quantity {} out of range for order {}", quantity, id)))?;

    Ok(Order {
        id: Uuid::parse_str(id)?,
        product_id: Uuid::parse_str(product_id)?,
        quantity,
        price: Decimal::from_str(price)?,
    })
}

/// Current time as RFC3339, the `received_at` column value.
pub fn received_at_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
