//! HTTP clients for the inventory and pricing services.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use domain::{Money, ProductId};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{CapabilityError, InventoryCapability, PriceQuote, PricingCapability, StockLevel};

fn transport_error(err: reqwest::Error) -> CapabilityError {
    if err.is_timeout() {
        CapabilityError::Timeout
    } else if err.is_decode() {
        CapabilityError::InvalidResponse(err.to_string())
    } else {
        CapabilityError::Unavailable(err.to_string())
    }
}

fn build_client(timeout: Duration) -> Result<Client, CapabilityError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CapabilityError::Unavailable(format!("failed to build http client: {e}")))
}

/// Reads a body that may be empty or `null` when the remote has no record.
async fn optional_body<T: for<'de> Deserialize<'de>>(
    response: Response,
) -> Result<Option<T>, CapabilityError> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let response = error_for_status(response)?;
    let body = response.text().await.map_err(transport_error)?;
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| CapabilityError::InvalidResponse(e.to_string()))
}

fn error_for_status(response: Response) -> Result<Response, CapabilityError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(CapabilityError::Unavailable(format!(
            "{} answered with status {status}",
            response.url().path()
        )))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InventoryResponse {
    quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceResponse {
    current_price: Option<Value>,
}

/// Inventory service client over `/api/inventory`.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CapabilityError> {
        Ok(Self::with_client(build_client(timeout)?, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/inventory{}", self.base_url, path)
    }
}

#[async_trait]
impl InventoryCapability for HttpInventoryClient {
    #[tracing::instrument(skip(self))]
    async fn is_in_stock(&self, product_id: ProductId) -> Result<bool, CapabilityError> {
        let response = self
            .client
            .get(self.url(&format!("/inStock/{product_id}")))
            .send()
            .await
            .map_err(transport_error)?;

        error_for_status(response)?
            .json::<bool>()
            .await
            .map_err(transport_error)
    }

    #[tracing::instrument(skip(self))]
    async fn get_stock(&self, product_id: ProductId) -> Result<Option<StockLevel>, CapabilityError> {
        let response = self
            .client
            .get(self.url(&format!("/{product_id}")))
            .send()
            .await
            .map_err(transport_error)?;

        let Some(record) = optional_body::<InventoryResponse>(response).await? else {
            return Ok(None);
        };

        let quantity = record.quantity.unwrap_or(0).max(0);
        Ok(Some(StockLevel {
            product_id,
            quantity_available: u32::try_from(quantity).unwrap_or(u32::MAX),
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn deduct(&self, product_id: ProductId, quantity: u32) -> Result<bool, CapabilityError> {
        let response = self
            .client
            .post(self.url(&format!("/outbound/{product_id}")))
            .query(&[("quantity", quantity)])
            .send()
            .await
            .map_err(transport_error)?;

        error_for_status(response)?
            .json::<bool>()
            .await
            .map_err(transport_error)
    }
}

/// Pricing service client over `/api/pricing`.
#[derive(Debug, Clone)]
pub struct HttpPricingClient {
    client: Client,
    base_url: String,
}

impl HttpPricingClient {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CapabilityError> {
        Ok(Self::with_client(build_client(timeout)?, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Converts a JSON price to exact cents. Sub-cent and negative prices are
/// rejected.
fn parse_price(value: &Value) -> Result<Money, CapabilityError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(CapabilityError::InvalidResponse(format!(
                "price is not a number: {other}"
            )));
        }
    };
    let price =
        Money::from_str(&text).map_err(|e| CapabilityError::InvalidResponse(e.to_string()))?;
    if price.is_negative() {
        return Err(CapabilityError::InvalidResponse(format!(
            "negative price: {price}"
        )));
    }
    Ok(price)
}

#[async_trait]
impl PricingCapability for HttpPricingClient {
    #[tracing::instrument(skip(self))]
    async fn current_price(
        &self,
        product_id: ProductId,
    ) -> Result<Option<PriceQuote>, CapabilityError> {
        let response = self
            .client
            .get(format!("{}/api/pricing/price/{product_id}", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;

        let Some(body) = optional_body::<PriceResponse>(response).await? else {
            return Ok(None);
        };

        match body.current_price {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(PriceQuote {
                product_id,
                unit_price: parse_price(&value)?,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::StatusCode as AxumStatus,
        routing::{get, post},
    };
    use serde_json::json;
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn inventory_router() -> Router {
        Router::new()
            .route(
                "/api/inventory/inStock/{id}",
                get(|Path(id): Path<i64>| async move { Json(id == 1) }),
            )
            .route(
                "/api/inventory/outbound/{id}",
                post(
                    |Path(id): Path<i64>, Query(q): Query<HashMap<String, u32>>| async move {
                        Json(id == 1 && q.get("quantity").copied().unwrap_or(0) <= 5)
                    },
                ),
            )
            .route(
                "/api/inventory/{id}",
                get(|Path(id): Path<i64>| async move {
                    match id {
                        1 => Json(json!({
                            "id": 10, "productId": 1, "quantity": 5,
                            "batchId": "B-1", "unitOfMeasure": "pcs"
                        })),
                        _ => Json(Value::Null),
                    }
                }),
            )
    }

    fn pricing_router() -> Router {
        Router::new().route(
            "/api/pricing/price/{id}",
            get(|Path(id): Path<i64>| async move {
                match id {
                    1 => (AxumStatus::OK, Json(json!({"productId": 1, "currentPrice": 5.99}))),
                    2 => (AxumStatus::OK, Json(json!({"productId": 2, "currentPrice": "7.50"}))),
                    3 => (AxumStatus::OK, Json(json!({"productId": 3, "currentPrice": 1.005}))),
                    4 => (AxumStatus::INTERNAL_SERVER_ERROR, Json(Value::Null)),
                    6 => (AxumStatus::OK, Json(json!({"productId": 6, "currentPrice": -2.5}))),
                    _ => (AxumStatus::OK, Json(Value::Null)),
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_inventory_client_against_stub_service() {
        let base = serve(inventory_router()).await;
        let client = HttpInventoryClient::new(base, Duration::from_secs(2)).unwrap();

        assert!(client.is_in_stock(ProductId::new(1)).await.unwrap());
        assert!(!client.is_in_stock(ProductId::new(2)).await.unwrap());

        assert!(client.deduct(ProductId::new(1), 3).await.unwrap());
        assert!(!client.deduct(ProductId::new(1), 6).await.unwrap());

        let level = client.get_stock(ProductId::new(1)).await.unwrap().unwrap();
        assert_eq!(level.quantity_available, 5);
        assert!(client.get_stock(ProductId::new(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pricing_client_parses_exact_prices() {
        let base = serve(pricing_router()).await;
        let client = HttpPricingClient::new(base, Duration::from_secs(2)).unwrap();

        let quote = client.current_price(ProductId::new(1)).await.unwrap().unwrap();
        assert_eq!(quote.unit_price, Money::from_cents(599));

        let quote = client.current_price(ProductId::new(2)).await.unwrap().unwrap();
        assert_eq!(quote.unit_price, Money::from_cents(750));

        assert!(matches!(
            client.current_price(ProductId::new(3)).await,
            Err(CapabilityError::InvalidResponse(_))
        ));
        assert!(matches!(
            client.current_price(ProductId::new(4)).await,
            Err(CapabilityError::Unavailable(_))
        ));
        assert!(client.current_price(ProductId::new(5)).await.unwrap().is_none());
        assert!(matches!(
            client.current_price(ProductId::new(6)).await,
            Err(CapabilityError::InvalidResponse(reason)) if reason.contains("negative")
        ));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let router = Router::new().route(
            "/api/pricing/price/{id}",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(Value::Null)
            }),
        );
        let base = serve(router).await;
        let client = HttpPricingClient::new(base, Duration::from_millis(50)).unwrap();

        assert_eq!(
            client.current_price(ProductId::new(1)).await,
            Err(CapabilityError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let client =
            HttpInventoryClient::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();

        assert!(matches!(
            client.is_in_stock(ProductId::new(1)).await,
            Err(CapabilityError::Unavailable(_))
        ));
    }
}
