//! Domain layer for order placement.
//!
//! This crate provides the entity model the placement workflow operates on:
//! - Value objects (identifiers, order numbers, money)
//! - The order status machine
//! - `NewOrder` (a fully priced order awaiting persistence) and the
//!   persisted `Order` / `OrderItem` forms

pub mod error;
pub mod order;

pub use error::DomainError;
pub use order::{
    CustomerId, Money, NewOrder, Order, OrderError, OrderId, OrderItem, OrderItemId, OrderLine,
    OrderNumber, OrderStatus, PricedLine, ProductId,
};
