//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use placement::{BreakerConfig, PlacementConfig, StockProtocol, TransitionPolicy};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres URL; in-memory store when unset
/// - `INVENTORY_URL`, `PRICING_URL`: collaborator base URLs; seeded
///   in-memory collaborators when unset
/// - `CALL_TIMEOUT_MS`: per remote call bound (default: `3000`)
/// - `STOCK_DIAGNOSTICS`: read stock before deducting (default: `true`)
/// - `STOCK_PROTOCOL`: `deduct` or `reserve` (default: `deduct`)
/// - `STATUS_POLICY`: `permissive` or `strict` (default: `permissive`)
/// - `BREAKER_WINDOW`, `BREAKER_MIN_CALLS`, `BREAKER_FAILURE_RATE`,
///   `BREAKER_OPEN_MS`, `BREAKER_TRIAL_CALLS`: circuit breaker tuning
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub inventory_url: Option<String>,
    pub pricing_url: Option<String>,
    pub stock_protocol: StockProtocol,
    pub placement: PlacementConfig,
    pub breaker: BreakerConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup. Unparsable values
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = &lookup;
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let placement = PlacementConfig::default()
            .with_call_timeout(
                parsed(lookup, "CALL_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.placement.call_timeout),
            )
            .with_stock_diagnostics(
                parsed(lookup, "STOCK_DIAGNOSTICS").unwrap_or(defaults.placement.stock_diagnostics),
            )
            .with_transition_policy(
                parsed::<TransitionPolicy>(lookup, "STATUS_POLICY")
                    .unwrap_or(defaults.placement.transition_policy),
            );

        let breaker = BreakerConfig::default()
            .with_window_size(parsed(lookup, "BREAKER_WINDOW").unwrap_or(defaults.breaker.window_size))
            .with_minimum_calls(
                parsed(lookup, "BREAKER_MIN_CALLS").unwrap_or(defaults.breaker.minimum_calls),
            )
            .with_failure_rate_threshold(
                parsed(lookup, "BREAKER_FAILURE_RATE").unwrap_or(defaults.breaker.failure_rate_threshold),
            )
            .with_open_duration(
                parsed(lookup, "BREAKER_OPEN_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.breaker.open_duration),
            )
            .with_half_open_trial_calls(
                parsed(lookup, "BREAKER_TRIAL_CALLS").unwrap_or(defaults.breaker.half_open_trial_calls),
            );

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parsed(lookup, "PORT").unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: non_empty("DATABASE_URL"),
            inventory_url: non_empty("INVENTORY_URL"),
            pricing_url: non_empty("PRICING_URL"),
            stock_protocol: parsed(lookup, "STOCK_PROTOCOL").unwrap_or(defaults.stock_protocol),
            placement,
            breaker,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            inventory_url: None,
            pricing_url: None,
            stock_protocol: StockProtocol::Deduct,
            placement: PlacementConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}
