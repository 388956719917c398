//! Order and order item entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    CustomerId, Money, OrderError, OrderId, OrderItemId, OrderNumber, OrderStatus, ProductId,
};

/// One requested line of an order: a product and how many units of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The product to order.
    pub product_id: ProductId,

    /// Quantity ordered.
    pub quantity: u32,
}

impl OrderLine {
    /// Largest quantity a single line may request; it must fit a signed
    /// 32-bit column.
    pub const MAX_QUANTITY: u32 = i32::MAX as u32;

    /// Creates a new order line.
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }

    /// Checks that the quantity is within `1..=MAX_QUANTITY`.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity == 0 || self.quantity > Self::MAX_QUANTITY {
            return Err(OrderError::InvalidQuantity {
                product_id: self.product_id,
                quantity: self.quantity,
            });
        }
        Ok(())
    }
}

/// A line whose unit price has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl PricedLine {
    /// Attaches a unit price to a requested line.
    pub fn new(line: OrderLine, unit_price: Money) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price,
        }
    }

    /// Returns quantity * unit_price, or `AmountOverflow`.
    pub fn line_total(&self) -> Result<Money, OrderError> {
        self.unit_price
            .checked_multiply(self.quantity)
            .ok_or(OrderError::AmountOverflow {
                product_id: self.product_id,
            })
    }
}

/// A fully priced order that has not been persisted yet.
///
/// The total is computed once, here, from the priced lines and carried
/// unchanged into storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub lines: Vec<PricedLine>,
}

impl NewOrder {
    /// Builds a `New` order with a fresh order number and the current time.
    pub fn from_priced_lines(
        customer_id: CustomerId,
        lines: Vec<PricedLine>,
    ) -> Result<Self, OrderError> {
        Self::build(OrderNumber::generate(), customer_id, Utc::now(), lines)
    }

    /// Builds a `New` order with explicit number and timestamp.
    pub fn build(
        order_number: OrderNumber,
        customer_id: CustomerId,
        created_at: DateTime<Utc>,
        lines: Vec<PricedLine>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::NoItems);
        }

        let mut total_amount = Money::zero();
        for line in &lines {
            OrderLine::new(line.product_id, line.quantity).validate()?;
            if line.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product_id: line.product_id,
                    price: line.unit_price,
                });
            }
            total_amount = total_amount
                .checked_add(line.line_total()?)
                .ok_or(OrderError::AmountOverflow {
                    product_id: line.product_id,
                })?;
        }

        Ok(Self {
            order_number,
            customer_id,
            created_at,
            status: OrderStatus::New,
            total_amount,
            lines,
        })
    }

    /// Returns the number of lines.
    pub fn item_count(&self) -> usize {
        self.lines.len()
    }
}

/// A persisted order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,

    /// Back-reference to the owning order.
    pub order_id: OrderId,

    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the total price for this item (quantity * unit_price), or
    /// `None` on overflow.
    pub fn total_price(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// A persisted order with its items in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Attaches store-assigned identifiers to a new order.
    ///
    /// `item_ids` must hold one id per line, in line order.
    pub fn from_new(id: OrderId, new_order: NewOrder, item_ids: &[OrderItemId]) -> Self {
        debug_assert_eq!(item_ids.len(), new_order.lines.len());

        let items = new_order
            .lines
            .iter()
            .zip(item_ids)
            .map(|(line, item_id)| OrderItem {
                id: *item_id,
                order_id: id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        Self {
            id,
            order_number: new_order.order_number,
            customer_id: new_order.customer_id,
            created_at: new_order.created_at,
            status: new_order.status,
            total_amount: new_order.total_amount,
            items,
        }
    }

    /// Sum of item totals; equals `total_amount` for any order placed here.
    pub fn items_total(&self) -> Option<Money> {
        self.items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.checked_add(item.total_price()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced(product: i64, quantity: u32, cents: i64) -> PricedLine {
        PricedLine::new(
            OrderLine::new(ProductId::new(product), quantity),
            Money::from_cents(cents),
        )
    }

    #[test]
    fn test_new_order_computes_exact_total() {
        let order = NewOrder::from_priced_lines(
            CustomerId::new(7),
            vec![priced(1, 3, 599), priced(2, 2, 750)],
        )
        .unwrap();

        assert_eq!(order.total_amount, Money::from_cents(3297));
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.item_count(), 2);
        assert!(order.order_number.as_str().starts_with("ORD-"));
    }

    #[test]
    fn test_new_order_rejects_empty_lines() {
        let result = NewOrder::from_priced_lines(CustomerId::new(1), vec![]);
        assert!(matches!(result, Err(OrderError::NoItems)));
    }

    #[test]
    fn test_new_order_rejects_zero_quantity() {
        let result = NewOrder::from_priced_lines(CustomerId::new(1), vec![priced(1, 0, 100)]);
        assert!(matches!(result, Err(OrderError::InvalidQuantity { .. })));
    }

    #[test]
    fn test_new_order_rejects_negative_price() {
        let result = NewOrder::from_priced_lines(CustomerId::new(1), vec![priced(1, 1, -1)]);
        assert!(matches!(result, Err(OrderError::InvalidPrice { .. })));
    }

    #[test]
    fn test_from_new_sets_back_references_in_line_order() {
        let new_order = NewOrder::from_priced_lines(
            CustomerId::new(3),
            vec![priced(5, 1, 100), priced(6, 2, 200)],
        )
        .unwrap();
        let order = Order::from_new(
            OrderId::new(10),
            new_order,
            &[OrderItemId::new(100), OrderItemId::new(101)],
        );

        assert!(order.items.iter().all(|item| item.order_id == order.id));
        assert_eq!(order.items[0].product_id, ProductId::new(5));
        assert_eq!(order.items[1].product_id, ProductId::new(6));
        assert_eq!(order.items_total(), Some(order.total_amount));
    }

    #[test]
    fn test_new_order_rejects_overflowing_total() {
        let result = NewOrder::from_priced_lines(
            CustomerId::new(1),
            vec![priced(1, 1, 100), priced(2, 4_000_000, i64::MAX / 1000)],
        );
        assert!(matches!(
            result,
            Err(OrderError::AmountOverflow { product_id }) if product_id == ProductId::new(2)
        ));

        let result = NewOrder::from_priced_lines(
            CustomerId::new(1),
            vec![priced(1, 1, i64::MAX), priced(2, 1, 1)],
        );
        assert!(matches!(result, Err(OrderError::AmountOverflow { .. })));
    }

    #[test]
    fn test_order_line_validation() {
        assert!(OrderLine::new(ProductId::new(1), 1).validate().is_ok());
        assert!(
            OrderLine::new(ProductId::new(1), OrderLine::MAX_QUANTITY)
                .validate()
                .is_ok()
        );
        assert!(OrderLine::new(ProductId::new(1), 0).validate().is_err());
        assert!(
            OrderLine::new(ProductId::new(1), OrderLine::MAX_QUANTITY + 1)
                .validate()
                .is_err()
        );
    }
}
