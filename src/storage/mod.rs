//! Order storage.
//!
//! Accepted orders are appended, one insert per order in its own
//! transaction. There is no update or delete path; a resubmitted order
//! becomes a second row.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};
use crate::order::Order;

pub mod helpers;
pub mod mock;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mock::MockOrderStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresOrderStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteOrderStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid UUID in stored row: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid decimal in stored row: {0}")]
    InvalidDecimal(#[from] rust_decimal::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Storage backend '{0}' is not enabled in this build")]
    BackendDisabled(String),
}

/// Durable store of accepted orders.
///
/// Implementations:
/// - `SqliteOrderStore`: SQLite via sqlx
/// - `PostgresOrderStore`: PostgreSQL via sqlx
/// - `MockOrderStore`: In-memory mock for testing
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create the orders table if it does not exist.
    async fn init(&self) -> Result<()>;

    /// Append one accepted order.
    async fn append(&self, order: &Order) -> Result<()>;

    /// All stored orders in insertion order.
    async fn list(&self) -> Result<Vec<Order>>;
}

/// Initialize storage based on configuration.
///
/// The returned store has its schema ensured.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn OrderStore>> {
    match config.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!(path = %config.sqlite.path, "Storage: sqlite");
            let store = Arc::new(SqliteOrderStore::connect(&config.sqlite.path).await?);
            store.init().await?;
            Ok(store)
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            info!("Storage: postgres");
            let store = Arc::new(
                PostgresOrderStore::connect(&config.postgres.uri, config.postgres.max_connections)
                    .await?,
            );
            store.init().await?;
            Ok(store)
        }
        #[allow(unreachable_patterns)]
        other => {
            error!(storage_type = %other, "Storage backend requested but its feature is not enabled");
            Err(StorageError::BackendDisabled(other.to_string()))
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::SqliteConfig;

    #[tokio::test]
    async fn test_init_storage_sqlite_memory() {
        let config = StorageConfig {
            storage_type: StorageType::Sqlite,
            sqlite: SqliteConfig {
                path: ":memory:".to_string(),
            },
            ..Default::default()
        };

        let store = init_storage(&config).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(config.storage_type, StorageType::Sqlite);
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_init_storage_disabled_backend() {
        let config = StorageConfig {
            storage_type: StorageType::Postgres,
            ..Default::default()
        };

        match init_storage(&config).await {
            Err(StorageError::BackendDisabled(kind)) => assert_eq!(kind, "postgres"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("postgres store opened without the postgres feature"),
        }
        assert_eq!(config.storage_type, StorageType::Postgres);
    }
}
