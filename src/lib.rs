//! order-ingest - asynchronous order ingestion
//!
//! Drains order events from a durable queue, validates each candidate against
//! the product service, and appends accepted orders to a relational store.
//!
//! ```text
//! producer -> [orders queue] -> OrderConsumer -> OrderValidator -> ProductOracle (HTTP)
//!                                      |
//!                                      v
//!                                 OrderStore (insert)
//! ```

pub mod bus;
pub mod clients;
pub mod config;
pub mod consumer;
pub mod order;
pub mod storage;
pub mod utils;
pub mod validation;

pub use order::{Order, ProductAttributes};
