//! Reservation-based placement.
//!
//! Stock is held per line with a reversible reservation instead of being
//! deducted outright. Holds are committed only after every line is priced,
//! and released in reverse order on any abort, so a failed placement gives
//! back everything it took.

use std::time::Instant;

use async_trait::async_trait;
use domain::{
    CustomerId, Money, Order, OrderId, OrderLine, OrderNumber, OrderStatus, PricedLine,
};
use order_store::OrderStore;

use crate::capabilities::{Operation, PricingCapability, ReservationId, ReservingInventory};
use crate::coordinator::{OrderPlacement, OrderPlacementCoordinator};
use crate::error::{PlacementError, Result};

/// Lifecycle of a single line's stock hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Reserved,
    Committed,
    Released,
}

impl ReservationState {
    /// Returns true if `next` is reachable from this state.
    pub fn can_transition_to(&self, next: ReservationState) -> bool {
        matches!(
            (self, next),
            (ReservationState::Reserved, ReservationState::Committed)
                | (ReservationState::Reserved, ReservationState::Released)
        )
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, ReservationState::Reserved)
    }
}

/// A line together with the hold taken for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReservation {
    pub line: OrderLine,
    pub reservation_id: ReservationId,
    state: ReservationState,
}

impl LineReservation {
    pub fn new(line: OrderLine, reservation_id: ReservationId) -> Self {
        Self {
            line,
            reservation_id,
            state: ReservationState::Reserved,
        }
    }

    pub fn state(&self) -> ReservationState {
        self.state
    }

    /// Moves to `next`. Returns false and leaves the state unchanged if the
    /// edge does not exist.
    pub fn transition(&mut self, next: ReservationState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

/// Placement coordinator using the reserve/commit/release protocol.
pub struct ReservingCoordinator<I, P, S> {
    inner: OrderPlacementCoordinator<I, P, S>,
}

impl<I, P, S> ReservingCoordinator<I, P, S>
where
    I: ReservingInventory,
    P: PricingCapability,
    S: OrderStore,
{
    pub fn new(inner: OrderPlacementCoordinator<I, P, S>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &OrderPlacementCoordinator<I, P, S> {
        &self.inner
    }

    async fn hold_and_price(
        &self,
        line: OrderLine,
        held: &mut Vec<LineReservation>,
        total: &mut Money,
    ) -> Result<PricedLine> {
        let product_id = line.product_id;
        self.inner.check_stock(&line).await?;
        let diagnosis = self.inner.diagnose(product_id).await;

        let reservation_id = self
            .inner
            .call(
                Operation::Reserve,
                product_id,
                self.inner.inventory().reserve(product_id, line.quantity),
            )
            .await?
            .ok_or(PlacementError::InsufficientOrMissingStock {
                product_id,
                requested: line.quantity,
                diagnosis,
            })?;

        tracing::debug!(%product_id, reservation_id = %reservation_id, "stock reserved");
        held.push(LineReservation::new(line, reservation_id));

        let priced = self.inner.price(line).await?;
        *total = OrderPlacementCoordinator::<I, P, S>::accumulate(*total, &priced)?;
        Ok(priced)
    }

    /// Commits open holds in request order, stopping at the first failure.
    async fn commit_all(&self, held: &mut [LineReservation]) -> Result<()> {
        for reservation in held.iter_mut().filter(|r| !r.state().is_final()) {
            self.inner
                .call(
                    Operation::Commit,
                    reservation.line.product_id,
                    self.inner.inventory().commit(&reservation.reservation_id),
                )
                .await?;
            reservation.transition(ReservationState::Committed);
        }
        Ok(())
    }

    /// Releases every open hold, newest first. Failures are logged only.
    async fn release_all(&self, held: &mut [LineReservation]) {
        for reservation in held.iter_mut().rev().filter(|r| !r.state().is_final()) {
            let product_id = reservation.line.product_id;
            match self
                .inner
                .call(
                    Operation::Release,
                    product_id,
                    self.inner.inventory().release(&reservation.reservation_id),
                )
                .await
            {
                Ok(()) => {
                    reservation.transition(ReservationState::Released);
                    metrics::counter!("order_placement_releases_total").increment(1);
                }
                Err(err) => {
                    metrics::counter!("order_placement_release_failures_total").increment(1);
                    tracing::warn!(
                        %product_id,
                        reservation_id = %reservation.reservation_id,
                        error = %err,
                        "failed to release stock reservation"
                    );
                }
            }
        }
    }

    async fn run(&self, customer_id: CustomerId, lines: Vec<OrderLine>) -> Result<OrderNumber> {
        OrderPlacementCoordinator::<I, P, S>::validate(&lines)?;

        let mut held = Vec::with_capacity(lines.len());
        let mut priced = Vec::with_capacity(lines.len());
        let mut total = Money::zero();
        for line in lines {
            match self.hold_and_price(line, &mut held, &mut total).await {
                Ok(priced_line) => priced.push(priced_line),
                Err(err) => {
                    self.release_all(&mut held).await;
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.commit_all(&mut held).await {
            self.release_all(&mut held).await;
            return Err(err);
        }

        self.inner
            .persist(customer_id, priced)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    error = %err,
                    committed = held.len(),
                    "order not stored after its stock was committed"
                );
            })
    }
}

#[async_trait]
impl<I, P, S> OrderPlacement for ReservingCoordinator<I, P, S>
where
    I: ReservingInventory,
    P: PricingCapability,
    S: OrderStore,
{
    #[tracing::instrument(skip(self, lines), fields(customer_id = %customer_id, lines = lines.len()))]
    async fn place_order(
        &self,
        customer_id: CustomerId,
        lines: Vec<OrderLine>,
    ) -> Result<OrderNumber> {
        metrics::counter!("order_placements_total").increment(1);
        let started = Instant::now();

        let result = self.run(customer_id, lines).await;
        OrderPlacementCoordinator::<I, P, S>::observe(&result, started);
        result
    }

    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        self.inner.update_order_status(order_id, status).await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.inner.get_order(order_id).await
    }

    async fn find_order(&self, order_number: &OrderNumber) -> Result<Option<Order>> {
        self.inner.find_order(order_number).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        self.inner.list_orders().await
    }
}
