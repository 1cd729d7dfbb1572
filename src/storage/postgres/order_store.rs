//! PostgreSQL OrderStore implementation.
//!
//! `price` is `NUMERIC(18, 2)`; validated prices never carry more than two
//! decimals, so the column does not round. Columns are read back as text to
//! avoid pulling in sqlx's decimal and uuid codecs.

use async_trait::async_trait;
use sea_query::{Alias, Expr, PostgresQueryBuilder, Query};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::order::Order;
use crate::storage::helpers::{order_from_columns, received_at_now};
use crate::storage::schema::{Orders, CREATE_ORDERS_TABLE_POSTGRES};
use crate::storage::{OrderStore, Result};

/// PostgreSQL implementation of OrderStore.
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `uri`.
    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_ORDERS_TABLE_POSTGRES)
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
                Expr::val(order.id.to_string()).cast_as(Alias::new("uuid")),
                Expr::val(order.product_id.to_string()).cast_as(Alias::new("uuid")),
                i64::from(order.quantity).into(),
                Expr::val(order.price.to_string()).cast_as(Alias::new("numeric")),
                Expr::val(received_at_now()).cast_as(Alias::new("timestamptz")),
            ])
            .to_string(PostgresQueryBuilder);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&query).execute(&mut *tx).await?;
        tx.commit().await?;

        debug!(order_id = %order.id, "Order stored");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let text = || Alias::new("text");
        let query = Query::select()
            .expr_as(Expr::col(Orders::Id).cast_as(text()), Orders::Id)
            .expr_as(Expr::col(Orders::ProductId).cast_as(text()), Orders::ProductId)
            .column(Orders::Quantity)
            .expr_as(Expr::col(Orders::Price).cast_as(text()), Orders::Price)
            .from(Orders::Table)
            .order_by(Orders::Seq, sea_query::Order::Asc)
            .to_string(PostgresQueryBuilder);

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
