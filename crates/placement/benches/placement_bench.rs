use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CustomerId, Money, OrderLine, ProductId};
use order_store::InMemoryOrderStore;
use placement::{
    BreakerConfig, InMemoryInventory, InMemoryPricing, OrderPlacement, OrderPlacementCoordinator,
    ResilientPlacement, ReservingCoordinator,
};

const PRODUCTS: i64 = 5;

fn inventory() -> InMemoryInventory {
    InMemoryInventory::with_stock((1..=PRODUCTS).map(|id| (ProductId::new(id), u32::MAX)))
}

fn pricing() -> InMemoryPricing {
    InMemoryPricing::with_prices(
        (1..=PRODUCTS).map(|id| (ProductId::new(id), Money::from_cents(100 * id + 99))),
    )
}

fn lines() -> Vec<OrderLine> {
    (1..=PRODUCTS)
        .map(|id| OrderLine::new(ProductId::new(id), 2))
        .collect()
}

fn bench_deduct_placement(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = OrderPlacementCoordinator::new(inventory(), pricing(), InMemoryOrderStore::new());

    c.bench_function("placement/deduct_five_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                coordinator
                    .place_order(CustomerId::new(1), lines())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_placement(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = ReservingCoordinator::new(OrderPlacementCoordinator::new(
        inventory(),
        pricing(),
        InMemoryOrderStore::new(),
    ));

    c.bench_function("placement/reserve_five_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                coordinator
                    .place_order(CustomerId::new(1), lines())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_guarded_placement(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let placement = ResilientPlacement::new(
        OrderPlacementCoordinator::new(inventory(), pricing(), InMemoryOrderStore::new()),
        BreakerConfig::default(),
    );

    c.bench_function("placement/guarded_five_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                placement
                    .place_order(CustomerId::new(1), lines())
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_deduct_placement,
    bench_reserve_placement,
    bench_guarded_placement
);
criterion_main!(benches);
