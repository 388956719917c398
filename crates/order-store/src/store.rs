use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, NewOrder, Order, OrderId, OrderLine, OrderNumber, OrderStatus};

use crate::{OrderStoreError, Result};

/// Core trait for order store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order together with all of its items.
    ///
    /// The write is atomic: either the order row and every item row are
    /// stored, or nothing is. Item identifiers and the owning-order
    /// back-reference are assigned here. Items keep the line order of
    /// `order.lines`.
    async fn insert(&self, order: NewOrder) -> Result<Order>;

    /// Retrieves an order with its items by store identifier.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Retrieves an order with its items by order number.
    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>>;

    /// Retrieves all orders, oldest first.
    async fn list(&self) -> Result<Vec<Order>>;

    /// Overwrites the status of an order and returns the updated order.
    ///
    /// No transition rules are applied here; callers decide which
    /// transitions are allowed.
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order>;

    /// Returns the number of stored orders.
    async fn count(&self) -> Result<usize>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        (**self).insert(order).await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).get(id).await
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        (**self).find_by_number(number).await
    }

    async fn list(&self) -> Result<Vec<Order>> {
        (**self).list().await
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        (**self).update_status(id, status).await
    }

    async fn count(&self) -> Result<usize> {
        (**self).count().await
    }
}

/// Validates an order before it is written.
///
/// Guards the aggregate invariants a store must never persist a violation
/// of: at least one item, positive quantities, non-negative prices, and a
/// total equal to the sum of the line totals.
pub fn validate_new_order(order: &NewOrder) -> Result<()> {
    if order.lines.is_empty() {
        return Err(OrderStoreError::InvalidOrder(
            "order must have at least one item".to_string(),
        ));
    }

    for line in &order.lines {
        OrderLine::new(line.product_id, line.quantity)
            .validate()
            .map_err(|e| OrderStoreError::InvalidOrder(e.to_string()))?;
    }

    if let Some(line) = order.lines.iter().find(|l| l.unit_price.is_negative()) {
        return Err(OrderStoreError::InvalidOrder(format!(
            "item for product {} has negative unit price {}",
            line.product_id, line.unit_price
        )));
    }

    let mut expected = Money::zero();
    for line in &order.lines {
        expected = line
            .line_total()
            .ok()
            .and_then(|total| expected.checked_add(total))
            .ok_or_else(|| {
                OrderStoreError::InvalidOrder(format!(
                    "total overflows at product {}",
                    line.product_id
                ))
            })?;
    }
    if expected != order.total_amount {
        return Err(OrderStoreError::InvalidOrder(format!(
            "total {} does not match item sum {}",
            order.total_amount, expected
        )));
    }

    Ok(())
}
