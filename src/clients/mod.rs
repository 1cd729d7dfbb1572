//! Product existence oracle.
//!
//! The validator asks the oracle whether an order's product exists. The
//! production implementation is the product service's HTTP API; tests use
//! [`MockProductOracle`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::order::ProductAttributes;

pub mod mock;
pub mod product;

pub use mock::MockProductOracle;
pub use product::HttpProductClient;

/// Answer to a product lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductLookup {
    /// The product exists.
    Found(ProductAttributes),
    /// The product service answered that no such product exists.
    NotFound,
    /// No answer could be obtained (network failure, timeout, server error).
    Unreachable(String),
}

impl ProductLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, ProductLookup::Found(_))
    }
}

/// Errors raised by product service clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Product service returned {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid product service configuration: {0}")]
    Config(String),
}

/// Resolves product identifiers.
///
/// Implementations:
/// - `HttpProductClient`: product service over HTTP
/// - `MockProductOracle`: in-memory catalogue for testing
#[async_trait]
pub trait ProductOracle: Send + Sync {
    /// Look up a product. Never fails; failures are reported as `Unreachable`.
    async fn resolve(&self, product_id: Uuid) -> ProductLookup;
}
