//! Order aggregate storage.
//!
//! An order and all of its items are written in one atomic operation;
//! readers never observe an order without its items.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{OrderStoreError, Result};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use store::{OrderStore, validate_new_order};
