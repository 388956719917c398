//! In-memory inventory with call recording and fault injection.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::ProductId;

use super::{
    CapabilityError, InventoryCapability, Operation, ReservationId, ReservingInventory, StockLevel,
};

/// A call received by [`InMemoryInventory`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCall {
    IsInStock(ProductId),
    GetStock(ProductId),
    Deduct(ProductId, u32),
    Reserve(ProductId, u32),
    Commit(ReservationId),
    Release(ReservationId),
}

#[derive(Debug, Clone)]
struct Hold {
    product_id: ProductId,
    quantity: u32,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    stock: HashMap<ProductId, u32>,
    in_stock_overrides: HashMap<ProductId, bool>,
    holds: HashMap<ReservationId, Hold>,
    next_reservation: u32,
    calls: Vec<InventoryCall>,
    failures: HashMap<Operation, CapabilityError>,
    delays: HashMap<Operation, Duration>,
}

/// In-memory inventory for tests and collaborator-less runs.
///
/// Stock semantics follow the inventory service: a product is in stock when
/// its quantity is positive, and a deduction succeeds only if a record
/// exists with at least the requested quantity.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventory {
    /// Creates an inventory with no stock records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inventory seeded with `(product, quantity)` records.
    pub fn with_stock(records: impl IntoIterator<Item = (ProductId, u32)>) -> Self {
        let inventory = Self::new();
        for (product_id, quantity) in records {
            inventory.set_stock(product_id, quantity);
        }
        inventory
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryInventoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the stock record for a product.
    pub fn set_stock(&self, product_id: ProductId, quantity: u32) {
        self.write().stock.insert(product_id, quantity);
    }

    /// Deletes the stock record for a product.
    pub fn remove_stock(&self, product_id: ProductId) {
        self.write().stock.remove(&product_id);
    }

    /// Forces the stock-check answer for a product regardless of quantity.
    pub fn set_in_stock_override(&self, product_id: ProductId, in_stock: bool) {
        self.write().in_stock_overrides.insert(product_id, in_stock);
    }

    /// Makes every call of `operation` fail with `error` until cleared.
    pub fn fail_on(&self, operation: Operation, error: CapabilityError) {
        self.write().failures.insert(operation, error);
    }

    /// Makes every call of `operation` take `delay` before answering.
    pub fn delay_on(&self, operation: Operation, delay: Duration) {
        self.write().delays.insert(operation, delay);
    }

    /// Removes all injected failures and delays.
    pub fn clear_faults(&self) {
        let mut state = self.write();
        state.failures.clear();
        state.delays.clear();
    }

    /// Returns the current quantity on record, if any.
    pub fn stock_of(&self, product_id: ProductId) -> Option<u32> {
        self.read().stock.get(&product_id).copied()
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<InventoryCall> {
        self.read().calls.clone()
    }

    /// Returns the number of deduction calls issued for a product.
    pub fn deduct_calls_for(&self, product_id: ProductId) -> usize {
        self.read()
            .calls
            .iter()
            .filter(|c| matches!(c, InventoryCall::Deduct(p, _) if *p == product_id))
            .count()
    }

    /// Returns the number of holds that are neither committed nor released.
    pub fn active_reservations(&self) -> usize {
        self.read().holds.len()
    }

    /// Records the call, then applies any injected delay and failure.
    async fn enter(&self, operation: Operation, call: InventoryCall) -> Result<(), CapabilityError> {
        let (delay, failure) = {
            let mut state = self.write();
            state.calls.push(call);
            (
                state.delays.get(&operation).copied(),
                state.failures.get(&operation).cloned(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InventoryCapability for InMemoryInventory {
    async fn is_in_stock(&self, product_id: ProductId) -> Result<bool, CapabilityError> {
        self.enter(Operation::StockCheck, InventoryCall::IsInStock(product_id))
            .await?;

        let state = self.read();
        if let Some(forced) = state.in_stock_overrides.get(&product_id) {
            return Ok(*forced);
        }
        Ok(state.stock.get(&product_id).is_some_and(|q| *q > 0))
    }

    async fn get_stock(&self, product_id: ProductId) -> Result<Option<StockLevel>, CapabilityError> {
        self.enter(Operation::StockRead, InventoryCall::GetStock(product_id))
            .await?;

        Ok(self
            .read()
            .stock
            .get(&product_id)
            .map(|quantity| StockLevel {
                product_id,
                quantity_available: *quantity,
            }))
    }

    async fn deduct(&self, product_id: ProductId, quantity: u32) -> Result<bool, CapabilityError> {
        self.enter(Operation::Deduct, InventoryCall::Deduct(product_id, quantity))
            .await?;

        let mut state = self.write();
        match state.stock.get_mut(&product_id) {
            Some(available) if *available >= quantity => {
                *available -= quantity;
                tracing::debug!(%product_id, quantity, remaining = *available, "stock deducted");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ReservingInventory for InMemoryInventory {
    async fn reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Option<ReservationId>, CapabilityError> {
        self.enter(Operation::Reserve, InventoryCall::Reserve(product_id, quantity))
            .await?;

        let mut state = self.write();
        match state.stock.get_mut(&product_id) {
            Some(available) if *available >= quantity => {
                *available -= quantity;
            }
            _ => return Ok(None),
        }

        state.next_reservation += 1;
        let reservation_id = ReservationId::new(format!("RES-{:04}", state.next_reservation));
        state.holds.insert(
            reservation_id.clone(),
            Hold {
                product_id,
                quantity,
            },
        );
        Ok(Some(reservation_id))
    }

    async fn commit(&self, reservation_id: &ReservationId) -> Result<(), CapabilityError> {
        self.enter(Operation::Commit, InventoryCall::Commit(reservation_id.clone()))
            .await?;

        let mut state = self.write();
        state
            .holds
            .remove(reservation_id)
            .map(|_| ())
            .ok_or_else(|| CapabilityError::Rejected(format!("unknown reservation {reservation_id}")))
    }

    async fn release(&self, reservation_id: &ReservationId) -> Result<(), CapabilityError> {
        self.enter(Operation::Release, InventoryCall::Release(reservation_id.clone()))
            .await?;

        let mut state = self.write();
        let hold = state.holds.remove(reservation_id).ok_or_else(|| {
            CapabilityError::Rejected(format!("unknown reservation {reservation_id}"))
        })?;
        *state.stock.entry(hold.product_id).or_insert(0) += hold.quantity;
        Ok(())
    }
}
