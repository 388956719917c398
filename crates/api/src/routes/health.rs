//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use placement::{BreakerSnapshot, CircuitState};
use serde::Serialize;

use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub breaker: BreakerSnapshot,
}

/// GET /health: reports "degraded" while the placement breaker is not closed.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let breaker = state.placement.breaker().snapshot();
    let status = match breaker.state {
        CircuitState::Closed => "ok",
        CircuitState::Open | CircuitState::HalfOpen => "degraded",
    };
    Json(HealthResponse { status, breaker })
}
