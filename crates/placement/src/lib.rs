//! Order placement coordination.
//!
//! This crate drives the multi-service workflow that turns an order request
//! into a persisted order:
//! 1. Check stock for the line
//! 2. Read the stock record (best effort, for error diagnostics)
//! 3. Deduct (or reserve) the requested quantity
//! 4. Look up the current unit price
//!
//! Lines are processed strictly in request order, every remote call is
//! bounded by a timeout, and the first failing line aborts the placement.
//! Once all lines succeed the order and its items are stored atomically.
//!
//! [`ResilientPlacement`] wraps the entry point with a circuit breaker that
//! answers with a degraded-mode response while dependencies are unhealthy.

pub mod capabilities;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod reservation;
pub mod resilience;

pub use capabilities::{
    CapabilityError, Dependency, HttpInventoryClient, HttpPricingClient, InMemoryInventory,
    InMemoryPricing, InventoryCall, InventoryCapability, Operation, PriceQuote,
    PricingCapability, ReservationId, ReservingInventory, StockLevel,
};
pub use config::{PlacementConfig, StockProtocol, TransitionPolicy};
pub use coordinator::{OrderPlacement, OrderPlacementCoordinator};
pub use error::{PlacementError, StockDiagnosis};
pub use reservation::{LineReservation, ReservationState, ReservingCoordinator};
pub use resilience::{
    BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitState, DegradedMode, FALLBACK_MESSAGE,
    GuardedError, ResilientPlacement,
};
