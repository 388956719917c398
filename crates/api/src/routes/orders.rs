//! Order placement, lookup and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{CustomerId, Order, OrderId, OrderItem, OrderLine, OrderStatus, ProductId};
use placement::{BreakerConfig, OrderPlacement, ResilientPlacement};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    /// Guarded placement. Reads and status updates go through `inner()`.
    pub placement: ResilientPlacement<Arc<dyn OrderPlacement>>,
}

impl AppState {
    pub fn new(placement: Arc<dyn OrderPlacement>, breaker: BreakerConfig) -> Self {
        Self {
            placement: ResilientPlacement::new(placement, breaker),
        }
    }
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub customer_id: i64,
    #[serde(default)]
    pub order_items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: String,
}

// -- Response types --

/// Amounts are exact decimal strings, e.g. `"32.97"`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: i64,
    pub order_number: String,
    pub customer_id: i64,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: String,
    pub order_items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price: String,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id.as_i64(),
            product_id: item.product_id.as_i64(),
            quantity: item.quantity,
            unit_price: item.unit_price.to_decimal_string(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.as_i64(),
            order_number: order.order_number.as_str().to_string(),
            customer_id: order.customer_id.as_i64(),
            order_date: order.created_at,
            status: order.status,
            total_amount: order.total_amount.to_decimal_string(),
            order_items: order.items.iter().map(OrderItemResponse::from).collect(),
        }
    }
}

// -- Handlers --

/// POST /api/order: places an order and returns its order number as text.
#[tracing::instrument(skip(state, req), fields(customer_id = req.customer_id))]
pub async fn place(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OrderRequest>,
) -> Result<(StatusCode, String), ApiError> {
    let lines = req
        .order_items
        .iter()
        .map(|item| OrderLine::new(ProductId::new(item.product_id), item.quantity))
        .collect();

    let order_number = state
        .placement
        .place_order(CustomerId::new(req.customer_id), lines)
        .await?;

    Ok((StatusCode::CREATED, order_number.as_str().to_string()))
}

/// GET /api/order
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.placement.inner().list_orders().await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /api/order/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .placement
        .inner()
        .get_order(OrderId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {id}")))?;

    Ok(Json(order.into()))
}

/// PUT /api/order/{id}/status?status=DELIVERING
#[tracing::instrument(skip(state))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<OrderResponse>, ApiError> {
    let status: OrderStatus = query.status.parse()?;

    let order = state
        .placement
        .inner()
        .update_order_status(OrderId::new(id), status)
        .await?;

    Ok(Json(order.into()))
}
