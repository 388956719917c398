//! The order placement workflow.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use domain::{
    CustomerId, Money, NewOrder, Order, OrderError, OrderId, OrderLine, OrderNumber, OrderStatus,
    PricedLine, ProductId,
};
use order_store::OrderStore;

use crate::capabilities::{CapabilityError, InventoryCapability, Operation, PricingCapability};
use crate::config::{PlacementConfig, TransitionPolicy};
use crate::error::{PlacementError, Result, StockDiagnosis};

/// Entry points exposed to callers of the placement workflow.
#[async_trait]
pub trait OrderPlacement: Send + Sync {
    /// Places an order and returns its order number.
    ///
    /// On failure nothing is written to the order store. Stock already taken
    /// for earlier lines may remain consumed, depending on the protocol.
    async fn place_order(
        &self,
        customer_id: CustomerId,
        lines: Vec<OrderLine>,
    ) -> Result<OrderNumber>;

    /// Sets the status of a stored order.
    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    async fn find_order(&self, order_number: &OrderNumber) -> Result<Option<Order>>;

    async fn list_orders(&self) -> Result<Vec<Order>>;
}

#[async_trait]
impl<T: OrderPlacement + ?Sized> OrderPlacement for Arc<T> {
    async fn place_order(
        &self,
        customer_id: CustomerId,
        lines: Vec<OrderLine>,
    ) -> Result<OrderNumber> {
        (**self).place_order(customer_id, lines).await
    }

    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        (**self).update_order_status(order_id, status).await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        (**self).get_order(order_id).await
    }

    async fn find_order(&self, order_number: &OrderNumber) -> Result<Option<Order>> {
        (**self).find_order(order_number).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        (**self).list_orders().await
    }
}

/// Drives the per-line workflow against inventory and pricing, then
/// persists the priced order.
///
/// Lines are processed strictly in request order and, within a line, the
/// calls are strictly ordered: stock check, optional stock read, deduct,
/// price. The first failure aborts the placement. Deductions already applied
/// are not reversed; see [`ReservingCoordinator`](crate::ReservingCoordinator)
/// for the reversible protocol.
pub struct OrderPlacementCoordinator<I, P, S> {
    inventory: I,
    pricing: P,
    store: S,
    config: PlacementConfig,
}

impl<I, P, S> OrderPlacementCoordinator<I, P, S>
where
    I: InventoryCapability,
    P: PricingCapability,
    S: OrderStore,
{
    /// Creates a coordinator with the default configuration.
    pub fn new(inventory: I, pricing: P, store: S) -> Self {
        Self {
            inventory,
            pricing,
            store,
            config: PlacementConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PlacementConfig) -> Self {
        self.config = config;
        self
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    pub fn pricing(&self) -> &P {
        &self.pricing
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub(crate) fn validate(lines: &[OrderLine]) -> Result<()> {
        if lines.is_empty() {
            return Err(OrderError::NoItems.into());
        }
        for line in lines {
            line.validate()?;
        }
        Ok(())
    }

    /// Runs one remote call under the per-call timeout and classifies its
    /// failure.
    pub(crate) async fn call<T>(
        &self,
        operation: Operation,
        product_id: ProductId,
        request: impl Future<Output = std::result::Result<T, CapabilityError>>,
    ) -> Result<T> {
        let dependency = operation.dependency();
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.call_timeout, request).await;
        metrics::histogram!(
            "order_placement_remote_call_seconds",
            "dependency" => dependency.as_str(),
            "operation" => operation.as_str()
        )
        .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CapabilityError::Timeout)) | Err(_) => Err(PlacementError::DependencyTimeout {
                dependency,
                operation,
                product_id,
            }),
            Ok(Err(err)) => Err(PlacementError::DependencyUnavailable {
                dependency,
                operation,
                product_id,
                reason: err.to_string(),
            }),
        }
    }

    pub(crate) async fn check_stock(&self, line: &OrderLine) -> Result<()> {
        let product_id = line.product_id;
        let in_stock = self
            .call(
                Operation::StockCheck,
                product_id,
                self.inventory.is_in_stock(product_id),
            )
            .await?;

        if !in_stock {
            return Err(PlacementError::OutOfStock { product_id });
        }
        Ok(())
    }

    /// Best-effort read of the stock record. Never fails the placement.
    pub(crate) async fn diagnose(&self, product_id: ProductId) -> StockDiagnosis {
        if !self.config.stock_diagnostics {
            return StockDiagnosis::Unknown;
        }

        match self
            .call(
                Operation::StockRead,
                product_id,
                self.inventory.get_stock(product_id),
            )
            .await
        {
            Ok(Some(level)) => StockDiagnosis::Available(level.quantity_available),
            Ok(None) => StockDiagnosis::NoRecord,
            Err(err) => {
                tracing::debug!(%product_id, error = %err, "stock read failed, continuing without diagnosis");
                StockDiagnosis::Unknown
            }
        }
    }

    async fn deduct(&self, line: &OrderLine, diagnosis: StockDiagnosis) -> Result<()> {
        let applied = self
            .call(
                Operation::Deduct,
                line.product_id,
                self.inventory.deduct(line.product_id, line.quantity),
            )
            .await?;

        if !applied {
            return Err(PlacementError::InsufficientOrMissingStock {
                product_id: line.product_id,
                requested: line.quantity,
                diagnosis,
            });
        }
        Ok(())
    }

    pub(crate) async fn price(&self, line: OrderLine) -> Result<PricedLine> {
        let product_id = line.product_id;
        let quote = self
            .call(
                Operation::PriceLookup,
                product_id,
                self.pricing.current_price(product_id),
            )
            .await?
            .ok_or(PlacementError::PriceUnavailable { product_id })?;

        if quote.unit_price.is_negative() {
            let reason =
                CapabilityError::InvalidResponse(format!("negative unit price {}", quote.unit_price));
            return Err(PlacementError::DependencyUnavailable {
                dependency: Operation::PriceLookup.dependency(),
                operation: Operation::PriceLookup,
                product_id,
                reason: reason.to_string(),
            });
        }

        Ok(PricedLine::new(line, quote.unit_price))
    }

    /// Adds a priced line to the running total, failing on overflow.
    pub(crate) fn accumulate(total: Money, line: &PricedLine) -> Result<Money> {
        let amount = line
            .line_total()?
            .checked_add(total)
            .ok_or(OrderError::AmountOverflow {
                product_id: line.product_id,
            })?;
        Ok(amount)
    }

    /// Builds the `New` order from priced lines and stores it atomically.
    pub(crate) async fn persist(
        &self,
        customer_id: CustomerId,
        lines: Vec<PricedLine>,
    ) -> Result<OrderNumber> {
        let order = NewOrder::from_priced_lines(customer_id, lines)?;
        let stored = self.store.insert(order).await?;

        tracing::info!(
            order_number = %stored.order_number,
            order_id = %stored.id,
            total = %stored.total_amount,
            items = stored.items.len(),
            "order placed"
        );
        Ok(stored.order_number)
    }

    pub(crate) fn observe(result: &Result<OrderNumber>, started: Instant) {
        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if let Err(err) = result {
            metrics::counter!("order_placements_failed_total", "kind" => err.kind()).increment(1);
            tracing::warn!(kind = err.kind(), error = %err, "order placement failed");
        }
    }

    async fn run(&self, customer_id: CustomerId, lines: Vec<OrderLine>) -> Result<OrderNumber> {
        Self::validate(&lines)?;

        let mut priced = Vec::with_capacity(lines.len());
        let mut total = Money::zero();
        for line in lines {
            self.check_stock(&line).await?;
            let diagnosis = self.diagnose(line.product_id).await;
            self.deduct(&line, diagnosis).await?;

            let priced_line = self.price(line).await?;
            total = Self::accumulate(total, &priced_line)?;
            priced.push(priced_line);

            tracing::debug!(product_id = %line.product_id, quantity = line.quantity, "line placed");
        }

        self.persist(customer_id, priced).await
    }
}

#[async_trait]
impl<I, P, S> OrderPlacement for OrderPlacementCoordinator<I, P, S>
where
    I: InventoryCapability,
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
        Self::observe(&result, started);
        result
    }

    #[tracing::instrument(skip(self))]
    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        if self.config.transition_policy == TransitionPolicy::Strict {
            let current = self
                .store
                .get(order_id)
                .await?
                .ok_or(PlacementError::OrderNotFound(order_id))?;

            if !current.status.can_transition_to(status) {
                return Err(OrderError::InvalidStatusTransition {
                    from: current.status,
                    to: status,
                }
                .into());
            }
        }

        let order = self.store.update_status(order_id, status).await?;
        metrics::counter!("order_status_updates_total").increment(1);
        tracing::info!(order_number = %order.order_number, status = %status, "order status updated");
        Ok(order)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.store.get(order_id).await?)
    }

    async fn find_order(&self, order_number: &OrderNumber) -> Result<Option<Order>> {
        Ok(self.store.find_by_number(order_number).await?)
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.list().await?)
    }
}
