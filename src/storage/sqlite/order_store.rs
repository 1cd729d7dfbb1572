//! SQLite OrderStore implementation.

use async_trait::async_trait;
use sea_query::{Query, SqliteQueryBuilder};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::order::Order;
use crate::storage::helpers::{order_from_columns, received_at_now};
use crate::storage::schema::{Orders, CREATE_ORDERS_TABLE_SQLITE};
use crate::storage::{OrderStore, Result};

/// SQLite implementation of OrderStore.
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    /// Create a store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database at `path`, creating the file if needed.
    ///
    /// `:memory:` opens a private in-memory database on a single
    /// connection that is never recycled.
    pub async fn connect(path: &str) -> Result<Self> {
        if path == ":memory:" {
            return Self::in_memory().await;
        }

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path)).await?;
        Ok(Self::new(pool))
    }

    /// In-memory database; each pooled connection would otherwise see its own.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::new(pool))
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_ORDERS_TABLE_SQLITE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append(&self, order: &Order) -> Result<()> {
        let query = Query::insert()
            .into_table(Orders::Table)
            .columns([
                Orders::Id,
                Orders::ProductId,
                Orders::Quantity,
                Orders::Price,
                Orders::ReceivedAt,
            ])
            .values_panic([
                order.id.to_string().into(),
                order.product_id.to_string().into(),
                order.quantity.into(),
                order.price.to_string().into(),
                received_at_now().into(),
            ])
            .to_string(SqliteQueryBuilder);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&query).execute(&mut *tx).await?;
        tx.commit().await?;

        debug!(order_id = %order.id, "Order stored");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let query = Query::select()
            .columns([
                Orders::Id,
                Orders::ProductId,
                Orders::Quantity,
                Orders::Price,
            ])
            .from(Orders::Table)
            .order_by(Orders::Seq, sea_query::Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let product_id: String = row.get("product_id");
            let quantity: i64 = row.get("quantity");
            let price: String = row.get("price");
            orders.push(order_from_columns(&id, &product_id, quantity, &price)?);
        }

        Ok(orders)
    }
}
