//! PostgreSQL implementation of the order store.

mod order_store;

pub use order_store::PostgresOrderStore;
