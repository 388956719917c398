//! API error types with HTTP response mapping.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError};
use placement::{DegradedMode, FALLBACK_MESSAGE, GuardedError, PlacementError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Placement or status update failed.
    Placement(PlacementError),
    /// The circuit breaker short-circuited the request.
    Degraded(DegradedMode),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Placement(err) => {
                let status = placement_status(&err);
                if status.is_server_error() {
                    tracing::error!(kind = err.kind(), error = %err, "order request failed");
                }
                (status, err.kind(), err.to_string())
            }
            ApiError::Degraded(degraded) => return degraded_response(degraded),
        };

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn placement_status(err: &PlacementError) -> StatusCode {
    match err {
        PlacementError::OutOfStock { .. } | PlacementError::InsufficientOrMissingStock { .. } => {
            StatusCode::CONFLICT
        }
        PlacementError::PriceUnavailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PlacementError::DependencyTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        PlacementError::DependencyUnavailable { .. } => StatusCode::BAD_GATEWAY,
        PlacementError::InvalidOrder(OrderError::InvalidStatusTransition { .. }) => {
            StatusCode::CONFLICT
        }
        // Only a pricing response can carry a negative price.
        PlacementError::InvalidOrder(OrderError::InvalidPrice { .. }) => StatusCode::BAD_GATEWAY,
        PlacementError::InvalidOrder(OrderError::AmountOverflow { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PlacementError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
        PlacementError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        PlacementError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 503 with the fixed fallback text and a `Retry-After` hint in seconds.
fn degraded_response(degraded: DegradedMode) -> Response {
    let retry_after = degraded.retry_after;
    let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);

    let mut response = (StatusCode::SERVICE_UNAVAILABLE, FALLBACK_MESSAGE).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
    response
}

impl From<PlacementError> for ApiError {
    fn from(err: PlacementError) -> Self {
        ApiError::Placement(err)
    }
}

impl From<GuardedError> for ApiError {
    fn from(err: GuardedError) -> Self {
        match err {
            GuardedError::DegradedMode(degraded) => ApiError::Degraded(degraded),
            GuardedError::Placement(err) => ApiError::Placement(err),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Order(err) => ApiError::Placement(PlacementError::InvalidOrder(err)),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
