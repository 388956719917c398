//! Integration tests for order placement over in-memory collaborators.

use std::time::Duration;

use domain::{CustomerId, Money, OrderLine, OrderStatus, ProductId};
use order_store::{InMemoryOrderStore, OrderStore};
use placement::{
    BreakerConfig, CapabilityError, CircuitState, GuardedError, InMemoryInventory,
    InMemoryPricing, InventoryCall, Operation, OrderPlacement, OrderPlacementCoordinator,
    PlacementConfig, PlacementError, ResilientPlacement, StockDiagnosis,
};

type TestCoordinator =
    OrderPlacementCoordinator<InMemoryInventory, InMemoryPricing, InMemoryOrderStore>;

struct TestHarness {
    coordinator: TestCoordinator,
    inventory: InMemoryInventory,
    pricing: InMemoryPricing,
    store: InMemoryOrderStore,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(PlacementConfig::default())
    }

    fn with_config(config: PlacementConfig) -> Self {
        let inventory = InMemoryInventory::with_stock([
            (product(1), 10),
            (product(2), 10),
            (product(4), 10),
            (product(9), 0),
        ]);
        let pricing = InMemoryPricing::with_prices([
            (product(1), Money::from_cents(599)),
            (product(2), Money::from_cents(750)),
        ]);
        let store = InMemoryOrderStore::new();

        let coordinator =
            OrderPlacementCoordinator::new(inventory.clone(), pricing.clone(), store.clone())
                .with_config(config);

        Self {
            coordinator,
            inventory,
            pricing,
            store,
        }
    }
}

fn product(id: i64) -> ProductId {
    ProductId::new(id)
}

fn line(id: i64, quantity: u32) -> OrderLine {
    OrderLine::new(product(id), quantity)
}

#[tokio::test]
async fn test_two_line_order_total_is_exact() {
    let h = TestHarness::new();

    let number = h
        .coordinator
        .place_order(CustomerId::new(7), vec![line(1, 3), line(2, 2)])
        .await
        .unwrap();

    let order = h.store.find_by_number(&number).await.unwrap().unwrap();
    assert!(number.as_str().starts_with("ORD-"));
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.customer_id, CustomerId::new(7));
    assert_eq!(order.total_amount, Money::from_cents(3297));
    assert_eq!(order.total_amount.to_decimal_string(), "32.97");
    assert_eq!(order.items_total(), Some(order.total_amount));

    assert_eq!(order.items.len(), 2);
    assert!(order.items.iter().all(|item| item.order_id == order.id));
    assert_eq!(order.items[0].product_id, product(1));
    assert_eq!(order.items[0].quantity, 3);
    assert_eq!(order.items[0].unit_price, Money::from_cents(599));
    assert_eq!(order.items[1].product_id, product(2));
    assert_eq!(order.items[1].unit_price, Money::from_cents(750));

    assert_eq!(h.inventory.stock_of(product(1)), Some(7));
    assert_eq!(h.inventory.stock_of(product(2)), Some(8));
}

#[tokio::test]
async fn test_out_of_stock_persists_nothing() {
    let h = TestHarness::new();

    let result = h
        .coordinator
        .place_order(CustomerId::new(1), vec![line(9, 1)])
        .await;

    assert!(matches!(
        result,
        Err(PlacementError::OutOfStock { product_id }) if product_id == product(9)
    ));
    assert_eq!(h.store.count().await.unwrap(), 0);
    assert_eq!(h.inventory.deduct_calls_for(product(9)), 0);
}

#[tokio::test]
async fn test_missing_price_keeps_deduction() {
    let h = TestHarness::new();

    let result = h
        .coordinator
        .place_order(CustomerId::new(1), vec![line(4, 2)])
        .await;

    assert!(matches!(
        result,
        Err(PlacementError::PriceUnavailable { product_id }) if product_id == product(4)
    ));
    assert_eq!(h.store.count().await.unwrap(), 0);
    assert_eq!(h.inventory.stock_of(product(4)), Some(8));
}

#[tokio::test(start_paused = true)]
async fn test_deduct_timeout_is_retryable() {
    let h = TestHarness::new();
    h.inventory
        .delay_on(Operation::Deduct, Duration::from_secs(30));

    let result = h
        .coordinator
        .place_order(CustomerId::new(1), vec![line(1, 1)])
        .await;

    assert!(matches!(
        result,
        Err(PlacementError::DependencyTimeout {
            operation: Operation::Deduct,
            ..
        })
    ));
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(h.store.count().await.unwrap(), 0);
    assert!(h.pricing.lookups().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_breaker_trips_and_recovers() {
    let h = TestHarness::new();
    h.inventory.fail_on(
        Operation::StockCheck,
        CapabilityError::Unavailable("connection refused".to_string()),
    );
    let placement = ResilientPlacement::new(h.coordinator, BreakerConfig::default());

    for _ in 0..3 {
        let result = placement
            .place_order(CustomerId::new(1), vec![line(1, 1)])
            .await;
        assert!(matches!(
            result,
            Err(GuardedError::Placement(PlacementError::DependencyUnavailable { .. }))
        ));
    }
    let checks_before = h.inventory.calls().len();

    let result = placement
        .place_order(CustomerId::new(1), vec![line(1, 1)])
        .await;
    assert!(matches!(result, Err(GuardedError::DegradedMode(_))));
    assert_eq!(h.inventory.calls().len(), checks_before);

    tokio::time::advance(Duration::from_secs(10)).await;
    h.inventory.clear_faults();

    let number = placement
        .place_order(CustomerId::new(1), vec![line(1, 1)])
        .await
        .unwrap();
    assert!(h.inventory.calls().len() > checks_before);
    assert!(h.store.find_by_number(&number).await.unwrap().is_some());
    assert_eq!(placement.breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_failed_check_stops_all_later_lines() {
    let h = TestHarness::new();

    let result = h
        .coordinator
        .place_order(
            CustomerId::new(1),
            vec![line(1, 1), line(9, 1), line(2, 1)],
        )
        .await;

    assert!(matches!(result, Err(PlacementError::OutOfStock { .. })));
    assert_eq!(h.inventory.deduct_calls_for(product(9)), 0);
    assert!(
        !h.inventory
            .calls()
            .iter()
            .any(|c| matches!(c, InventoryCall::IsInStock(p) if *p == product(2)))
    );
    // Line 1 already consumed its stock.
    assert_eq!(h.inventory.stock_of(product(1)), Some(9));
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_refused_deduction_skips_pricing_for_that_line() {
    let h = TestHarness::new();

    let result = h
        .coordinator
        .place_order(CustomerId::new(1), vec![line(1, 2), line(2, 11)])
        .await;

    match result {
        Err(PlacementError::InsufficientOrMissingStock {
            product_id,
            requested,
            diagnosis,
        }) => {
            assert_eq!(product_id, product(2));
            assert_eq!(requested, 11);
            assert_eq!(diagnosis, StockDiagnosis::Available(10));
        }
        other => panic!("expected insufficient stock, got {other:?}"),
    }
    assert_eq!(h.pricing.lookups(), vec![product(1)]);
    assert_eq!(h.inventory.stock_of(product(1)), Some(8));
}

#[tokio::test]
async fn test_missing_record_is_diagnosed() {
    let h = TestHarness::new();
    h.inventory.remove_stock(product(2));
    h.inventory.set_in_stock_override(product(2), true);

    let result = h
        .coordinator
        .place_order(CustomerId::new(1), vec![line(2, 1)])
        .await;

    let err = result.unwrap_err();
    assert!(matches!(
        err,
        PlacementError::InsufficientOrMissingStock {
            diagnosis: StockDiagnosis::NoRecord,
            ..
        }
    ));
    assert!(err.to_string().contains("no inventory record"));
}

#[tokio::test]
async fn test_later_failure_leaves_earlier_deductions_applied() {
    let h = TestHarness::new();

    let result = h
        .coordinator
        .place_order(
            CustomerId::new(1),
            vec![line(1, 3), line(2, 2), line(4, 1)],
        )
        .await;

    assert!(matches!(result, Err(PlacementError::PriceUnavailable { .. })));
    assert_eq!(h.inventory.stock_of(product(1)), Some(7));
    assert_eq!(h.inventory.stock_of(product(2)), Some(8));
    assert_eq!(h.inventory.stock_of(product(4)), Some(9));
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_negative_price_stops_later_lines() {
    let h = TestHarness::new();
    h.pricing.set_price(product(1), Money::from_cents(-100));

    let err = h
        .coordinator
        .place_order(CustomerId::new(1), vec![line(1, 1), line(2, 2)])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "dependency_unavailable");
    assert_eq!(
        h.inventory.calls(),
        vec![
            InventoryCall::IsInStock(product(1)),
            InventoryCall::GetStock(product(1)),
            InventoryCall::Deduct(product(1), 1),
        ]
    );
    assert_eq!(h.inventory.stock_of(product(2)), Some(10));
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_overflowing_total_is_rejected_before_later_lines() {
    let h = TestHarness::new();
    h.inventory.set_stock(product(1), 5_000_000);
    h.pricing
        .set_price(product(1), Money::from_cents(i64::MAX / 1000));

    let err = h
        .coordinator
        .place_order(CustomerId::new(1), vec![line(1, 4_000_000), line(2, 1)])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "amount_overflow");
    assert!(!err.is_retryable());
    assert_eq!(h.inventory.deduct_calls_for(product(2)), 0);
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_quantity_beyond_limit_is_rejected_before_any_call() {
    let h = TestHarness::new();

    let err = h
        .coordinator
        .place_order(
            CustomerId::new(1),
            vec![line(1, 1), line(2, OrderLine::MAX_QUANTITY + 1)],
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "invalid_quantity");
    assert!(h.inventory.calls().is_empty());
}

#[tokio::test]
async fn test_pricing_outage_is_dependency_unavailable() {
    let h = TestHarness::new();
    h.pricing
        .fail_with(CapabilityError::Unavailable("503".to_string()));

    let err = h
        .coordinator
        .place_order(CustomerId::new(1), vec![line(1, 1)])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "dependency_unavailable");
    assert!(err.is_dependency_failure());
}

#[tokio::test]
async fn test_concurrent_placements_each_persist_once() {
    let h = TestHarness::new();
    h.inventory.set_stock(product(1), 1_000);
    let coordinator = std::sync::Arc::new(h.coordinator);

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .place_order(CustomerId::new(i), vec![line(1, 2)])
                    .await
            })
        })
        .collect();

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap());
    }
    numbers.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    numbers.dedup();

    assert_eq!(numbers.len(), 20);
    assert_eq!(h.store.count().await.unwrap(), 20);
    assert_eq!(h.inventory.stock_of(product(1)), Some(960));
}

#[tokio::test]
async fn test_status_updates_pass_through() {
    let h = TestHarness::new();
    let number = h
        .coordinator
        .place_order(CustomerId::new(1), vec![line(1, 1)])
        .await
        .unwrap();
    let order = h.coordinator.find_order(&number).await.unwrap().unwrap();

    let updated = h
        .coordinator
        .update_order_status(order.id, OrderStatus::Delivering)
        .await
        .unwrap();

    assert_eq!(updated.status, OrderStatus::Delivering);
    assert_eq!(updated.total_amount, order.total_amount);
    let listed = h.coordinator.list_orders().await.unwrap();
    assert_eq!(listed[0].status, OrderStatus::Delivering);
}
