use std::sync::Arc;

use async_trait::async_trait;
use domain::{NewOrder, Order, OrderId, OrderItemId, OrderNumber, OrderStatus};
use tokio::sync::RwLock;

use crate::{
    OrderStoreError, Result,
    store::{OrderStore, validate_new_order},
};

#[derive(Debug, Default)]
struct InMemoryState {
    orders: Vec<Order>,
    last_order_id: i64,
    last_item_id: i64,
    fail_on_insert: bool,
}

/// In-memory order store implementation.
///
/// This implementation keeps all orders in memory and provides the same
/// interface and atomicity as the PostgreSQL implementation: an insert
/// happens under a single write lock, so readers see the whole order or
/// nothing.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail every insert (simulated outage).
    pub async fn set_fail_on_insert(&self, fail: bool) {
        self.state.write().await.fail_on_insert = fail;
    }

    /// Removes all orders.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.orders.clear();
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    #[tracing::instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        validate_new_order(&order)?;

        let mut state = self.state.write().await;

        if state.fail_on_insert {
            return Err(OrderStoreError::Unavailable(
                "in-memory store configured to fail".to_string(),
            ));
        }

        // Unique constraint simulation
        if state
            .orders
            .iter()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(OrderStoreError::DuplicateOrderNumber(order.order_number));
        }

        state.last_order_id += 1;
        let order_id = OrderId::new(state.last_order_id);

        let first_item_id = state.last_item_id + 1;
        state.last_item_id += order.lines.len() as i64;
        let item_ids: Vec<OrderItemId> = (first_item_id..=state.last_item_id)
            .map(OrderItemId::new)
            .collect();

        let stored = Order::from_new(order_id, order, &item_ids);
        state.orders.push(stored.clone());

        metrics::counter!("order_store_inserts_total").increment(1);
        Ok(stored)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .find(|o| &o.order_number == number)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.clone())
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(OrderStoreError::OrderNotFound(id))?;

        order.status = status;
        Ok(order.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.orders.len())
    }
}
