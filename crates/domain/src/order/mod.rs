//! Order entity model and related types.

mod model;
mod state;
mod value_objects;

pub use model::{NewOrder, Order, OrderItem, OrderLine, PricedLine};
pub use state::OrderStatus;
pub use value_objects::{CustomerId, Money, OrderId, OrderItemId, OrderNumber, ProductId};

use thiserror::Error;

/// Errors that can occur while building or transitioning an order.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order has no lines.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error(
        "Invalid quantity {quantity} for product {product_id} (must be between 1 and {})",
        OrderLine::MAX_QUANTITY
    )]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Invalid price.
    #[error("Invalid unit price {price} for product {product_id} (must not be negative)")]
    InvalidPrice { product_id: ProductId, price: Money },

    /// A line total or the order total does not fit the amount type.
    #[error("Amount overflow while totaling product {product_id}")]
    AmountOverflow { product_id: ProductId },

    /// The requested status change is not an edge of the status machine.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
}
