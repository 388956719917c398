//! HTTP API server for order placement.
//!
//! Exposes the guarded placement entry point plus order reads and status
//! updates, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, put};
use domain::{Money, ProductId};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, OrderStore};
use placement::{
    CapabilityError, HttpInventoryClient, HttpPricingClient, InMemoryInventory, InMemoryPricing,
    OrderPlacement, OrderPlacementCoordinator, PricingCapability, ReservingCoordinator,
    StockProtocol,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/api/order",
            get(routes::orders::list).post(routes::orders::place),
        )
        .route("/api/order/{id}", get(routes::orders::get))
        .route("/api/order/{id}/status", put(routes::orders::update_status))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// In-memory collaborators used when no services are configured.
#[derive(Clone, Default)]
pub struct DemoCollaborators {
    pub inventory: InMemoryInventory,
    pub pricing: InMemoryPricing,
    pub store: InMemoryOrderStore,
}

impl DemoCollaborators {
    /// Products 1 and 2 with 100 units each, priced 5.99 and 7.50.
    pub fn seeded() -> Self {
        Self {
            inventory: InMemoryInventory::with_stock([
                (ProductId::new(1), 100),
                (ProductId::new(2), 100),
            ]),
            pricing: InMemoryPricing::with_prices([
                (ProductId::new(1), Money::from_cents(599)),
                (ProductId::new(2), Money::from_cents(750)),
            ]),
            store: InMemoryOrderStore::new(),
        }
    }
}

/// Creates application state backed entirely by seeded in-memory
/// collaborators. Returns the collaborators so callers can inspect them.
pub fn create_default_state(config: &Config) -> (Arc<AppState>, DemoCollaborators) {
    let demo = DemoCollaborators::seeded();
    let coordinator = OrderPlacementCoordinator::new(
        demo.inventory.clone(),
        demo.pricing.clone(),
        demo.store.clone(),
    )
    .with_config(config.placement.clone());

    let placement: Arc<dyn OrderPlacement> = match config.stock_protocol {
        StockProtocol::Deduct => Arc::new(coordinator),
        StockProtocol::Reserve => Arc::new(ReservingCoordinator::new(coordinator)),
    };

    (
        Arc::new(AppState::new(placement, config.breaker.clone())),
        demo,
    )
}

/// Wires the placement workflow from configuration.
///
/// Configured service URLs get HTTP clients; anything unset falls back to
/// the seeded in-memory collaborator. The HTTP inventory has no reservation
/// endpoints, so `reserve` is honored only with the in-memory inventory.
pub fn build_placement(
    config: &Config,
    store: Arc<dyn OrderStore>,
) -> Result<Arc<dyn OrderPlacement>, CapabilityError> {
    let timeout = config.placement.call_timeout;
    let demo = DemoCollaborators::seeded();

    let pricing: Arc<dyn PricingCapability> = match &config.pricing_url {
        Some(url) => Arc::new(HttpPricingClient::new(url.as_str(), timeout)?),
        None => {
            tracing::info!("PRICING_URL not set, using in-memory pricing");
            Arc::new(demo.pricing)
        }
    };

    let placement: Arc<dyn OrderPlacement> = match (&config.inventory_url, config.stock_protocol) {
        (Some(url), protocol) => {
            if protocol == StockProtocol::Reserve {
                tracing::warn!("inventory service has no reservation endpoints, deducting instead");
            }
            let inventory = HttpInventoryClient::new(url.as_str(), timeout)?;
            Arc::new(
                OrderPlacementCoordinator::new(inventory, pricing, store)
                    .with_config(config.placement.clone()),
            )
        }
        (None, protocol) => {
            tracing::info!("INVENTORY_URL not set, using in-memory inventory");
            let coordinator = OrderPlacementCoordinator::new(demo.inventory, pricing, store)
                .with_config(config.placement.clone());
            match protocol {
                StockProtocol::Deduct => Arc::new(coordinator),
                StockProtocol::Reserve => Arc::new(ReservingCoordinator::new(coordinator)),
            }
        }
    };

    Ok(placement)
}

/// Creates application state from configuration with the given store.
pub fn create_state(
    config: &Config,
    store: Arc<dyn OrderStore>,
) -> Result<Arc<AppState>, CapabilityError> {
    let placement = build_placement(config, store)?;
    Ok(Arc::new(AppState::new(placement, config.breaker.clone())))
}
