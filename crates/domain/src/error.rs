//! Domain error types.

use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the order model.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A monetary amount could not be parsed.
    #[error("Invalid amount '{input}': {reason}")]
    InvalidAmount { input: String, reason: &'static str },

    /// An order status name could not be parsed.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
