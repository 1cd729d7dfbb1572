//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Orders table schema.
#[derive(Iden)]
pub enum Orders {
    Table,
    /// Store-assigned surrogate key; insertion order.
    #[iden = "seq"]
    Seq,
    #[iden = "id"]
    Id,
    #[iden = "product_id"]
    ProductId,
    #[iden = "quantity"]
    Quantity,
    #[iden = "price"]
    Price,
    #[iden = "received_at"]
    ReceivedAt,
}

/// SQLite DDL for the orders table.
pub const CREATE_ORDERS_TABLE_SQLITE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    price TEXT NOT NULL,
    received_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_id ON orders(id);
"#;

/// PostgreSQL DDL for the orders table.
pub const CREATE_ORDERS_TABLE_POSTGRES: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    seq BIGSERIAL PRIMARY KEY,
    id UUID NOT NULL,
    product_id UUID NOT NULL,
    quantity BIGINT NOT NULL,
    price NUMERIC(18, 2) NOT NULL,
    received_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_id ON orders(id);
"#;
