//! Circuit breaker around order placement.
//!
//! States:
//! - Closed: calls pass through and their outcomes fill a sliding window
//! - Open: calls are short-circuited with [`DegradedMode`] until the
//!   cooldown elapses
//! - HalfOpen: a limited number of trial calls decide whether to close or
//!   re-open
//!
//! Only dependency failures count against health. Refusals such as
//! out-of-stock are successful calls from the breaker's point of view.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use domain::{CustomerId, OrderLine, OrderNumber};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::coordinator::OrderPlacement;
use crate::error::PlacementError;

/// Body of the degraded-mode response.
pub const FALLBACK_MESSAGE: &str = "Oops! Something went wrong, please order after some time!";

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Number of most recent outcomes considered.
    pub window_size: usize,
    /// Outcomes required in the window before the rate is evaluated.
    pub minimum_calls: usize,
    /// Failure fraction in `[0, 1]` at or above which the breaker opens.
    pub failure_rate_threshold: f64,
    /// Cooldown before a trial call is let through.
    pub open_duration: Duration,
    /// Successful trials required to close again.
    pub half_open_trial_calls: usize,
}

impl BreakerConfig {
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    pub fn with_minimum_calls(mut self, minimum_calls: usize) -> Self {
        self.minimum_calls = minimum_calls.max(1);
        self
    }

    pub fn with_failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.failure_rate_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_open_duration(mut self, open_duration: Duration) -> Self {
        self.open_duration = open_duration;
        self
    }

    pub fn with_half_open_trial_calls(mut self, trials: usize) -> Self {
        self.half_open_trial_calls = trials.max(1);
        self
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            minimum_calls: 3,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(10),
            half_open_trial_calls: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Short-circuit outcome. Always means "retry later".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{}", FALLBACK_MESSAGE)]
pub struct DegradedMode {
    /// Time until the breaker lets a trial call through.
    pub retry_after: Duration,
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub window_calls: usize,
    pub window_failures: usize,
    pub failure_rate: f64,
    pub total_permitted: u64,
    pub total_rejected: u64,
    pub total_failures: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    outcomes: VecDeque<bool>,
    opened_at: Option<Instant>,
    trials_issued: usize,
    trial_successes: usize,
}

impl BreakerState {
    fn failures(&self) -> usize {
        self.outcomes.iter().filter(|failed| **failed).count()
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.failures() as f64 / self.outcomes.len() as f64
        }
    }
}

/// Count-based sliding-window circuit breaker.
///
/// State transitions happen under one mutex; lifetime totals are atomics so
/// concurrent callers never lose updates.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    permitted: AtomicU64,
    rejected: AtomicU64,
    failures: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        metrics::gauge!("order_placement_breaker_open").set(0.0);
        Self {
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                outcomes: VecDeque::with_capacity(config.window_size),
                opened_at: None,
                trials_issued: 0,
                trial_successes: 0,
            }),
            config,
            permitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state, moving Open to HalfOpen if the cooldown has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut state = self.lock();
        self.refresh(&mut state);
        state.state
    }

    fn refresh(&self, state: &mut BreakerState) {
        if state.state == CircuitState::Open
            && state
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.open_duration)
        {
            state.state = CircuitState::HalfOpen;
            state.trials_issued = 0;
            state.trial_successes = 0;
            metrics::gauge!("order_placement_breaker_open").set(0.0);
            tracing::info!("circuit breaker half-open, allowing trial calls");
        }
    }

    /// Asks to run one call. The returned permit must be resolved with
    /// [`CallPermit::record`].
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, DegradedMode> {
        let mut state = self.lock();
        self.refresh(&mut state);

        let trial = match state.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen if state.trials_issued < self.config.half_open_trial_calls => {
                state.trials_issued += 1;
                true
            }
            CircuitState::HalfOpen => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(DegradedMode {
                    retry_after: Duration::ZERO,
                });
            }
            CircuitState::Open => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                let elapsed = state.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                return Err(DegradedMode {
                    retry_after: self.config.open_duration.saturating_sub(elapsed),
                });
            }
        };

        self.permitted.fetch_add(1, Ordering::Relaxed);
        Ok(CallPermit {
            breaker: self,
            trial,
            recorded: false,
        })
    }

    fn on_result(&self, trial: bool, failed: bool) {
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        let mut state = self.lock();
        match (state.state, trial) {
            (CircuitState::Closed, false) => {
                state.outcomes.push_back(failed);
                while state.outcomes.len() > self.config.window_size {
                    state.outcomes.pop_front();
                }

                if state.outcomes.len() >= self.config.minimum_calls
                    && state.failure_rate() >= self.config.failure_rate_threshold
                {
                    let rate = state.failure_rate();
                    self.trip(&mut state);
                    tracing::warn!(failure_rate = rate, "circuit breaker opened");
                }
            }
            (CircuitState::HalfOpen, true) if failed => {
                self.trip(&mut state);
                tracing::warn!("trial call failed, circuit breaker re-opened");
            }
            (CircuitState::HalfOpen, true) => {
                state.trial_successes += 1;
                if state.trial_successes >= self.config.half_open_trial_calls {
                    state.state = CircuitState::Closed;
                    state.outcomes.clear();
                    state.opened_at = None;
                    metrics::gauge!("order_placement_breaker_open").set(0.0);
                    tracing::info!("circuit breaker closed");
                }
            }
            // Outcome of a call admitted under an earlier state.
            _ => {}
        }
    }

    fn trip(&self, state: &mut BreakerState) {
        state.state = CircuitState::Open;
        state.opened_at = Some(Instant::now());
        state.trials_issued = 0;
        state.trial_successes = 0;
        metrics::gauge!("order_placement_breaker_open").set(1.0);
    }

    fn abandon_trial(&self) {
        let mut state = self.lock();
        if state.state == CircuitState::HalfOpen && state.trials_issued > 0 {
            state.trials_issued -= 1;
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut state = self.lock();
        self.refresh(&mut state);
        BreakerSnapshot {
            state: state.state,
            window_calls: state.outcomes.len(),
            window_failures: state.failures(),
            failure_rate: state.failure_rate(),
            total_permitted: self.permitted.load(Ordering::Relaxed),
            total_rejected: self.rejected.load(Ordering::Relaxed),
            total_failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Admission to run one call through the breaker.
///
/// Dropping an unrecorded trial permit frees its half-open slot.
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    recorded: bool,
}

impl CallPermit<'_> {
    pub fn record(mut self, failed: bool) {
        self.recorded = true;
        self.breaker.on_result(self.trial, failed);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded && self.trial {
            self.breaker.abandon_trial();
        }
    }
}

/// Result of a guarded placement.
#[derive(Debug, Error)]
pub enum GuardedError {
    #[error(transparent)]
    DegradedMode(#[from] DegradedMode),

    #[error(transparent)]
    Placement(#[from] PlacementError),
}

impl GuardedError {
    pub fn kind(&self) -> &'static str {
        match self {
            GuardedError::DegradedMode(_) => "degraded_mode",
            GuardedError::Placement(err) => err.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GuardedError::DegradedMode(_) => true,
            GuardedError::Placement(err) => err.is_retryable(),
        }
    }
}

/// Placement entry point guarded by a [`CircuitBreaker`].
pub struct ResilientPlacement<C> {
    inner: C,
    breaker: CircuitBreaker,
}

impl<C: OrderPlacement> ResilientPlacement<C> {
    pub fn new(inner: C, config: BreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config),
        }
    }

    /// The unguarded placement, for reads and status updates.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Places an order unless the breaker is open.
    ///
    /// While open, the inner placement is not invoked at all.
    #[tracing::instrument(skip(self, lines), fields(customer_id = %customer_id))]
    pub async fn place_order(
        &self,
        customer_id: CustomerId,
        lines: Vec<OrderLine>,
    ) -> Result<OrderNumber, GuardedError> {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(degraded) => {
                metrics::counter!("order_placement_short_circuits_total").increment(1);
                tracing::warn!(
                    retry_after_ms = degraded.retry_after.as_millis() as u64,
                    "order placement short-circuited"
                );
                return Err(degraded.into());
            }
        };

        let result = self.inner.place_order(customer_id, lines).await;
        permit.record(matches!(&result, Err(err) if err.is_dependency_failure()));
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::{Order, OrderId, OrderStatus, ProductId};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use crate::capabilities::{Dependency, Operation};

    #[derive(Default)]
    struct ScriptedPlacement {
        calls: AtomicUsize,
        failing: AtomicBool,
        out_of_stock: AtomicBool,
    }

    impl ScriptedPlacement {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrderPlacement for ScriptedPlacement {
        async fn place_order(
            &self,
            _customer_id: CustomerId,
            _lines: Vec<OrderLine>,
        ) -> crate::error::Result<OrderNumber> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(PlacementError::DependencyTimeout {
                    dependency: Dependency::Inventory,
                    operation: Operation::Deduct,
                    product_id: ProductId::new(1),
                });
            }
            if self.out_of_stock.load(Ordering::SeqCst) {
                return Err(PlacementError::OutOfStock {
                    product_id: ProductId::new(1),
                });
            }
            Ok(OrderNumber::generate())
        }

        async fn update_order_status(
            &self,
            order_id: OrderId,
            _status: OrderStatus,
        ) -> crate::error::Result<Order> {
            Err(PlacementError::OrderNotFound(order_id))
        }

        async fn get_order(&self, _order_id: OrderId) -> crate::error::Result<Option<Order>> {
            Ok(None)
        }

        async fn find_order(
            &self,
            _order_number: &OrderNumber,
        ) -> crate::error::Result<Option<Order>> {
            Ok(None)
        }

        async fn list_orders(&self) -> crate::error::Result<Vec<Order>> {
            Ok(vec![])
        }
    }

    fn lines() -> Vec<OrderLine> {
        vec![OrderLine::new(ProductId::new(1), 1)]
    }

    fn guarded() -> ResilientPlacement<Arc<ScriptedPlacement>> {
        ResilientPlacement::new(Arc::new(ScriptedPlacement::default()), BreakerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_dependency_failures_and_recovers() {
        let placement = guarded();
        placement.inner().failing.store(true, Ordering::SeqCst);

        for _ in 0..3 {
            let result = placement.place_order(CustomerId::new(1), lines()).await;
            assert!(matches!(result, Err(GuardedError::Placement(_))));
        }
        assert_eq!(placement.breaker().state(), CircuitState::Open);

        let result = placement.place_order(CustomerId::new(1), lines()).await;
        match result {
            Err(GuardedError::DegradedMode(degraded)) => {
                assert_eq!(degraded.retry_after, Duration::from_secs(10));
                assert_eq!(degraded.to_string(), FALLBACK_MESSAGE);
            }
            other => panic!("expected degraded mode, got {other:?}"),
        }
        assert_eq!(placement.inner().calls(), 3);

        tokio::time::advance(Duration::from_secs(10)).await;
        placement.inner().failing.store(false, Ordering::SeqCst);

        assert!(placement.place_order(CustomerId::new(1), lines()).await.is_ok());
        assert_eq!(placement.inner().calls(), 4);
        assert_eq!(placement.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let placement = guarded();
        placement.inner().failing.store(true, Ordering::SeqCst);
        for _ in 0..3 {
            let _ = placement.place_order(CustomerId::new(1), lines()).await;
        }

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(placement.breaker().state(), CircuitState::HalfOpen);

        let trial = placement.place_order(CustomerId::new(1), lines()).await;
        assert!(matches!(trial, Err(GuardedError::Placement(_))));
        assert_eq!(placement.breaker().state(), CircuitState::Open);

        let blocked = placement.place_order(CustomerId::new(1), lines()).await;
        assert!(matches!(blocked, Err(GuardedError::DegradedMode(_))));
        assert_eq!(placement.inner().calls(), 4);
    }

    #[tokio::test]
    async fn test_business_refusals_do_not_trip() {
        let placement = guarded();
        placement.inner().out_of_stock.store(true, Ordering::SeqCst);

        for _ in 0..10 {
            let result = placement.place_order(CustomerId::new(1), lines()).await;
            assert_eq!(result.unwrap_err().kind(), "out_of_stock");
        }

        let snapshot = placement.breaker().snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.window_failures, 0);
        assert_eq!(snapshot.total_permitted, 10);
    }

    #[tokio::test]
    async fn test_failure_rate_below_threshold_stays_closed() {
        let breaker = CircuitBreaker::new(BreakerConfig::default());

        for failed in [true, false, false, false, true] {
            breaker.try_acquire().unwrap().record(failed);
        }

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.window_calls, 5);
        assert!((snapshot.failure_rate - 0.4).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let breaker = CircuitBreaker::new(
            BreakerConfig::default()
                .with_window_size(4)
                .with_minimum_calls(4)
                .with_failure_rate_threshold(0.75),
        );

        for failed in [true, true, false, false, false, true, true] {
            breaker.try_acquire().unwrap().record(failed);
        }

        // Window now holds [false, false, true, true].
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.window_calls, 4);
        assert_eq!(snapshot.window_failures, 2);
        assert_eq!(snapshot.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_permit_frees_the_slot() {
        let breaker = CircuitBreaker::new(
            BreakerConfig::default().with_open_duration(Duration::from_secs(1)),
        );
        for _ in 0..3 {
            breaker.try_acquire().unwrap().record(true);
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        let permit = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_err());
        drop(permit);

        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording_loses_no_updates() {
        let breaker = Arc::new(CircuitBreaker::new(
            BreakerConfig::default().with_window_size(1000),
        ));

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let breaker = breaker.clone();
                tokio::spawn(async move {
                    if let Ok(permit) = breaker.try_acquire() {
                        permit.record(false);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.total_permitted, 200);
        assert_eq!(snapshot.window_calls, 200);
        assert_eq!(snapshot.state, CircuitState::Closed);
    }
}
