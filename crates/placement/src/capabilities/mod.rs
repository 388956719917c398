//! Remote capabilities the coordinator depends on, plus HTTP and in-memory
//! implementations.

pub mod http;
pub mod inventory;
pub mod pricing;

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, ProductId};
use thiserror::Error;

pub use http::{HttpInventoryClient, HttpPricingClient};
pub use inventory::{InMemoryInventory, InventoryCall};
pub use pricing::InMemoryPricing;

/// The external system a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    Inventory,
    Pricing,
}

impl Dependency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Inventory => "inventory",
            Dependency::Pricing => "pricing",
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single remote operation issued during placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    StockCheck,
    StockRead,
    Deduct,
    Reserve,
    Commit,
    Release,
    PriceLookup,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::StockCheck => "stock_check",
            Operation::StockRead => "stock_read",
            Operation::Deduct => "deduct",
            Operation::Reserve => "reserve",
            Operation::Commit => "commit",
            Operation::Release => "release",
            Operation::PriceLookup => "price_lookup",
        }
    }

    /// The dependency this operation is served by.
    pub fn dependency(&self) -> Dependency {
        match self {
            Operation::PriceLookup => Dependency::Pricing,
            _ => Dependency::Inventory,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transport-level failure talking to a capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// The transport gave up waiting for a response.
    #[error("request timed out")]
    Timeout,

    /// The remote side could not be reached or answered with an error status.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The remote side refused a reservation command.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Current stock record for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub quantity_available: u32,
}

/// Current unit price for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub product_id: ProductId,
    pub unit_price: Money,
}

/// Identifier of a reversible stock hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReservationId(String);

impl ReservationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stock operations exposed by the inventory system.
#[async_trait]
pub trait InventoryCapability: Send + Sync {
    /// Returns true if the product has any stock.
    async fn is_in_stock(&self, product_id: ProductId) -> Result<bool, CapabilityError>;

    /// Returns the stock record, or None if inventory has no record.
    async fn get_stock(&self, product_id: ProductId) -> Result<Option<StockLevel>, CapabilityError>;

    /// Deducts stock. Returns false if inventory refused the deduction.
    ///
    /// A `true` result is an applied, irreversible change.
    async fn deduct(&self, product_id: ProductId, quantity: u32) -> Result<bool, CapabilityError>;
}

/// Two-phase stock operations for inventories that support holds.
#[async_trait]
pub trait ReservingInventory: InventoryCapability {
    /// Holds stock. Returns None if inventory refused the hold.
    async fn reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Option<ReservationId>, CapabilityError>;

    /// Turns a hold into a permanent deduction.
    async fn commit(&self, reservation_id: &ReservationId) -> Result<(), CapabilityError>;

    /// Returns held stock to availability.
    async fn release(&self, reservation_id: &ReservationId) -> Result<(), CapabilityError>;
}

/// Price lookups exposed by the pricing system.
#[async_trait]
pub trait PricingCapability: Send + Sync {
    /// Returns the current price, or None if the product has none.
    async fn current_price(&self, product_id: ProductId)
    -> Result<Option<PriceQuote>, CapabilityError>;
}

#[async_trait]
impl<T: InventoryCapability + ?Sized> InventoryCapability for Arc<T> {
    async fn is_in_stock(&self, product_id: ProductId) -> Result<bool, CapabilityError> {
        (**self).is_in_stock(product_id).await
    }

    async fn get_stock(&self, product_id: ProductId) -> Result<Option<StockLevel>, CapabilityError> {
        (**self).get_stock(product_id).await
    }

    async fn deduct(&self, product_id: ProductId, quantity: u32) -> Result<bool, CapabilityError> {
        (**self).deduct(product_id, quantity).await
    }
}

#[async_trait]
impl<T: PricingCapability + ?Sized> PricingCapability for Arc<T> {
    async fn current_price(
        &self,
        product_id: ProductId,
    ) -> Result<Option<PriceQuote>, CapabilityError> {
        (**self).current_price(product_id).await
    }
}
