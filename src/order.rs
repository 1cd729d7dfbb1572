//! Order payload and product attributes.
//!
//! Orders travel as JSON. Field names are camelCase; the PascalCase names
//! emitted by older producers are accepted as aliases. `price` keeps the
//! scale it was written with, so `1.500` decodes with scale 3.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An order event as carried on the queue and persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Producer-generated identifier.
    #[serde(alias = "Id")]
    pub id: Uuid,
    #[serde(alias = "ProductId")]
    pub product_id: Uuid,
    #[serde(alias = "Quantity")]
    pub quantity: u32,
    #[serde(alias = "Price")]
    pub price: Decimal,
}

impl Order {
    /// Create an order with a fresh identifier.
    pub fn new(product_id: Uuid, quantity: u32, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            quantity,
            price,
        }
    }

    /// Decode an order from a message body.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Encode the order as a message body.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Product as returned by the product service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAttributes {
    #[serde(alias = "Id")]
    pub id: Uuid,
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Description")]
    pub description: String,
    #[serde(alias = "Price")]
    pub price: Decimal,
}
