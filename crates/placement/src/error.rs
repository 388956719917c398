//! Placement error types.

use domain::{OrderError, OrderId, ProductId};
use order_store::OrderStoreError;
use thiserror::Error;

use crate::capabilities::{Dependency, Operation};

/// What the best-effort stock read revealed before a refused deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDiagnosis {
    /// Inventory has no record for the product.
    NoRecord,
    /// Inventory reported this many units at read time.
    Available(u32),
    /// The read was disabled, failed or timed out.
    Unknown,
}

impl std::fmt::Display for StockDiagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockDiagnosis::NoRecord => write!(f, "no inventory record"),
            StockDiagnosis::Available(n) => write!(f, "insufficient quantity, {n} available"),
            StockDiagnosis::Unknown => write!(f, "stock level unknown"),
        }
    }
}

/// Errors that can occur while placing or updating an order.
///
/// Every placement attempt ends in exactly one of these or an order number.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// Inventory reported the product as not in stock.
    #[error("Product {product_id} is not in stock, please try again later")]
    OutOfStock { product_id: ProductId },

    /// Inventory refused to deduct or reserve the requested quantity.
    #[error("Failed to deduct stock for product {product_id} (requested {requested}): {diagnosis}")]
    InsufficientOrMissingStock {
        product_id: ProductId,
        requested: u32,
        diagnosis: StockDiagnosis,
    },

    /// Pricing returned no current price for the product.
    #[error("Could not retrieve price for product {product_id}")]
    PriceUnavailable { product_id: ProductId },

    /// A remote call exceeded its time bound.
    #[error("{dependency} {operation} for product {product_id} timed out")]
    DependencyTimeout {
        dependency: Dependency,
        operation: Operation,
        product_id: ProductId,
    },

    /// A remote call failed at the transport level.
    #[error("{dependency} {operation} for product {product_id} failed: {reason}")]
    DependencyUnavailable {
        dependency: Dependency,
        operation: Operation,
        product_id: ProductId,
        reason: String,
    },

    /// The request or the status change violates an order rule.
    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(OrderStoreError),
}

impl PlacementError {
    /// Stable snake-case name used in logs, metric labels and API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PlacementError::OutOfStock { .. } => "out_of_stock",
            PlacementError::InsufficientOrMissingStock { .. } => "insufficient_or_missing_stock",
            PlacementError::PriceUnavailable { .. } => "price_unavailable",
            PlacementError::DependencyTimeout { .. } => "dependency_timeout",
            PlacementError::DependencyUnavailable { .. } => "dependency_unavailable",
            PlacementError::InvalidOrder(OrderError::NoItems) => "empty_order",
            PlacementError::InvalidOrder(OrderError::InvalidQuantity { .. }) => "invalid_quantity",
            PlacementError::InvalidOrder(OrderError::InvalidPrice { .. }) => "invalid_price",
            PlacementError::InvalidOrder(OrderError::AmountOverflow { .. }) => "amount_overflow",
            PlacementError::InvalidOrder(OrderError::InvalidStatusTransition { .. }) => {
                "invalid_status_transition"
            }
            PlacementError::OrderNotFound(_) => "order_not_found",
            PlacementError::Store(_) => "store_error",
        }
    }

    /// Returns true for failures of a dependency rather than of the request.
    ///
    /// These are the outcomes the circuit breaker counts against health.
    /// A store rejecting the order it was handed is a request problem, not
    /// an outage.
    pub fn is_dependency_failure(&self) -> bool {
        match self {
            PlacementError::DependencyTimeout { .. } | PlacementError::DependencyUnavailable { .. } => {
                true
            }
            PlacementError::Store(OrderStoreError::InvalidOrder(_)) => false,
            PlacementError::Store(_) => true,
            _ => false,
        }
    }

    /// Returns true if repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_dependency_failure()
    }
}

impl From<OrderStoreError> for PlacementError {
    fn from(err: OrderStoreError) -> Self {
        match err {
            OrderStoreError::OrderNotFound(id) => PlacementError::OrderNotFound(id),
            other => PlacementError::Store(other),
        }
    }
}

/// Convenience type alias for placement results.
pub type Result<T> = std::result::Result<T, PlacementError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::OrderStatus;

    #[test]
    fn test_diagnosis_distinguishes_missing_record_from_shortage() {
        let missing = PlacementError::InsufficientOrMissingStock {
            product_id: ProductId::new(3),
            requested: 5,
            diagnosis: StockDiagnosis::NoRecord,
        };
        let short = PlacementError::InsufficientOrMissingStock {
            product_id: ProductId::new(3),
            requested: 5,
            diagnosis: StockDiagnosis::Available(2),
        };
        let unknown = PlacementError::InsufficientOrMissingStock {
            product_id: ProductId::new(3),
            requested: 5,
            diagnosis: StockDiagnosis::Unknown,
        };

        assert!(missing.to_string().contains("no inventory record"));
        assert!(short.to_string().contains("2 available"));
        assert_eq!(
            unknown.to_string(),
            "Failed to deduct stock for product 3 (requested 5): stock level unknown"
        );
    }

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(
            PlacementError::OutOfStock {
                product_id: ProductId::new(9)
            }
            .kind(),
            "out_of_stock"
        );
        assert_eq!(
            PlacementError::InvalidOrder(OrderError::NoItems).kind(),
            "empty_order"
        );
        assert_eq!(
            PlacementError::InvalidOrder(OrderError::InvalidStatusTransition {
                from: OrderStatus::Completed,
                to: OrderStatus::New,
            })
            .kind(),
            "invalid_status_transition"
        );
    }

    #[test]
    fn test_only_dependency_failures_are_retryable() {
        let timeout = PlacementError::DependencyTimeout {
            dependency: Dependency::Inventory,
            operation: Operation::Deduct,
            product_id: ProductId::new(1),
        };
        let refused = PlacementError::PriceUnavailable {
            product_id: ProductId::new(1),
        };
        let store = PlacementError::from(OrderStoreError::Unavailable("down".to_string()));
        let rejected =
            PlacementError::from(OrderStoreError::InvalidOrder("quantity too large".to_string()));

        assert!(timeout.is_retryable());
        assert!(store.is_dependency_failure());
        assert!(!rejected.is_dependency_failure());
        assert_eq!(rejected.kind(), "store_error");
        assert!(!refused.is_retryable());
        assert!(!refused.is_dependency_failure());
    }

    #[test]
    fn test_store_not_found_maps_to_order_not_found() {
        let err = PlacementError::from(OrderStoreError::OrderNotFound(OrderId::new(4)));
        assert!(matches!(err, PlacementError::OrderNotFound(id) if id == OrderId::new(4)));
    }
}
