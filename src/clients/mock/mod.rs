//! Mock product oracle for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ProductLookup, ProductOracle};
use crate::order::ProductAttributes;

/// In-memory product catalogue.
#[derive(Default)]
pub struct MockProductOracle {
    products: RwLock<HashMap<Uuid, ProductAttributes>>,
    unreachable: RwLock<bool>,
    delay: RwLock<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockProductOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogue containing the given product ids.
    pub async fn with_products(ids: &[Uuid]) -> Self {
        let oracle = Self::new();
        for id in ids {
            oracle.add_product(*id).await;
        }
        oracle
    }

    /// Register a product with placeholder attributes.
    pub async fn add_product(&self, id: Uuid) {
        self.insert(ProductAttributes {
            id,
            name: format!("product-{}", id),
            description: String::new(),
            price: Decimal::new(100, 2),
        })
        .await;
    }

    pub async fn insert(&self, product: ProductAttributes) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn remove(&self, id: Uuid) {
        self.products.write().await.remove(&id);
    }

    /// Answer every lookup with `Unreachable`.
    pub async fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.write().await = unreachable;
    }

    /// Delay every lookup, for timeout tests.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    /// Number of lookups served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductOracle for MockProductOracle {
    async fn resolve(&self, product_id: Uuid) -> ProductLookup {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.unreachable.read().await {
            return ProductLookup::Unreachable("Mock product service unreachable".to_string());
        }

        match self.products.read().await.get(&product_id) {
            Some(product) => ProductLookup::Found(product.clone()),
            None => ProductLookup::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_oracle_found_and_not_found() {
        let known = Uuid::new_v4();
        let oracle = MockProductOracle::with_products(&[known]).await;

        assert!(oracle.resolve(known).await.is_found());
        assert_eq!(oracle.resolve(Uuid::new_v4()).await, ProductLookup::NotFound);
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_oracle_unreachable() {
        let known = Uuid::new_v4();
        let oracle = MockProductOracle::with_products(&[known]).await;
        oracle.set_unreachable(true).await;

        assert!(matches!(
            oracle.resolve(known).await,
            ProductLookup::Unreachable(_)
        ));
    }

    #[tokio::test]
    async fn test_mock_oracle_remove() {
        let known = Uuid::new_v4();
        let oracle = MockProductOracle::with_products(&[known]).await;
        oracle.remove(known).await;

        assert_eq!(oracle.resolve(known).await, ProductLookup::NotFound);
    }
}
