//! Placement tuning knobs.

use std::str::FromStr;
use std::time::Duration;

/// How stock is taken from inventory for each line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockProtocol {
    /// Irreversible deduction per line. Earlier deductions stay applied when
    /// a later step fails.
    #[default]
    Deduct,
    /// Reversible hold per line, committed only after every line is priced.
    Reserve,
}

impl FromStr for StockProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deduct" => Ok(StockProtocol::Deduct),
            "reserve" => Ok(StockProtocol::Reserve),
            other => Err(format!("unknown stock protocol '{other}'")),
        }
    }
}

/// Whether status updates are checked against the order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may be written; the store is the only gate.
    #[default]
    Permissive,
    /// Only lifecycle edges are accepted.
    Strict,
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "strict" => Ok(TransitionPolicy::Strict),
            other => Err(format!("unknown status policy '{other}'")),
        }
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct PlacementConfig {
    /// Upper bound on every individual remote call.
    pub call_timeout: Duration,
    /// Whether to read the stock record before deducting, for error context.
    pub stock_diagnostics: bool,
    pub transition_policy: TransitionPolicy,
}

impl PlacementConfig {
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_stock_diagnostics(mut self, enabled: bool) -> Self {
        self.stock_diagnostics = enabled;
        self
    }

    pub fn with_transition_policy(mut self, policy: TransitionPolicy) -> Self {
        self.transition_policy = policy;
        self
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            stock_diagnostics: true,
            transition_policy: TransitionPolicy::Permissive,
        }
    }
}
