use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::{Money, ProductId};

use super::{CapabilityError, PriceQuote, PricingCapability};

#[derive(Debug, Default)]
struct InMemoryPricingState {
    prices: HashMap<ProductId, Money>,
    lookups: Vec<ProductId>,
    failure: Option<CapabilityError>,
    delay: Option<Duration>,
}

/// In-memory price list for tests and collaborator-less runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPricing {
    state: Arc<RwLock<InMemoryPricingState>>,
}

impl InMemoryPricing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a price list seeded with `(product, unit price)` entries.
    pub fn with_prices(prices: impl IntoIterator<Item = (ProductId, Money)>) -> Self {
        let pricing = Self::new();
        for (product_id, price) in prices {
            pricing.set_price(product_id, price);
        }
        pricing
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryPricingState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryPricingState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_price(&self, product_id: ProductId, price: Money) {
        self.write().prices.insert(product_id, price);
    }

    pub fn remove_price(&self, product_id: ProductId) {
        self.write().prices.remove(&product_id);
    }

    /// Makes every lookup fail with `error` until cleared.
    pub fn fail_with(&self, error: CapabilityError) {
        self.write().failure = Some(error);
    }

    /// Makes every lookup take `delay` before answering.
    pub fn delay_by(&self, delay: Duration) {
        self.write().delay = Some(delay);
    }

    pub fn clear_faults(&self) {
        let mut state = self.write();
        state.failure = None;
        state.delay = None;
    }

    /// Returns the products looked up so far, in call order.
    pub fn lookups(&self) -> Vec<ProductId> {
        self.read().lookups.clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.read().lookups.len()
    }
}

#[async_trait]
impl PricingCapability for InMemoryPricing {
    async fn current_price(
        &self,
        product_id: ProductId,
    ) -> Result<Option<PriceQuote>, CapabilityError> {
        let (delay, failure) = {
            let mut state = self.write();
            state.lookups.push(product_id);
            (state.delay, state.failure.clone())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(self
            .read()
            .prices
            .get(&product_id)
            .map(|unit_price| PriceQuote {
                product_id,
                unit_price: *unit_price,
            }))
    }
}
