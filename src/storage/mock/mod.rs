//! Mock order store for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{OrderStore, Result, StorageError};
use crate::order::Order;

/// Mock order store that keeps orders in memory.
#[derive(Default)]
pub struct MockOrderStore {
    orders: RwLock<Vec<Order>>,
    fail_on_append: RwLock<bool>,
}

impl MockOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    pub async fn stored_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for MockOrderStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn append(&self, order: &Order) -> Result<()> {
        if *self.fail_on_append.read().await {
            return Err(StorageError::Unavailable("Mock store failure".to_string()));
        }
        self.orders.write().await.push(order.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Order>> {
        Ok(self.orders.read().await.clone())
    }
}
