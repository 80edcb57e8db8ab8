use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    CartStore, Checkout, CheckoutRequest, Currency, CustomerId, InMemoryCatalog, Money,
    OrderLedger, PaymentMethod, PricingPolicy, Product, ProductId, ShippingAddress,
    ShippingOption, VendorId,
};
use event_store::InMemoryEventStore;

fn catalog(stock: u32) -> InMemoryCatalog {
    let vendor = VendorId::new();
    InMemoryCatalog::from_products((0..20).map(|n| Product {
        id: ProductId::new(format!("SKU-{n}")),
        vendor_id: vendor,
        name: format!("Chew toy {n}"),
        price: Money::from_cents(499 + n * 100),
        stock,
        active: true,
    }))
}

fn address() -> ShippingAddress {
    ShippingAddress {
        recipient: "Bench Mark".into(),
        line1: "1 Kibble Way".into(),
        city: "Portland".into(),
        postal_code: "97201".into(),
        country: "US".into(),
        ..Default::default()
    }
}

fn bench_pricing(c: &mut Criterion) {
    let policy = PricingPolicy::default();
    let lines: Vec<(Money, u32)> = (1..=20)
        .map(|n| (Money::from_cents(n * 1_299), (n % 4 + 1) as u32))
        .collect();

    c.bench_function("pricing/twenty_lines", |b| {
        b.iter(|| policy.price(lines.iter().copied(), ShippingOption::Express));
    });
}

fn bench_cart_add(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let carts = CartStore::new(Arc::new(catalog(u32::MAX)));

    c.bench_function("cart/add_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                carts
                    .add_item(CustomerId::new(), ProductId::new("SKU-3"), 2)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let catalog = Arc::new(catalog(u32::MAX / 2));
    let carts = Arc::new(CartStore::new(catalog.clone()));
    let ledger = Arc::new(OrderLedger::new(
        InMemoryEventStore::new(),
        catalog,
        PricingPolicy::default(),
        Currency::usd(),
    ));
    let checkout = Checkout::new(carts.clone(), ledger);

    c.bench_function("checkout/three_line_cart", |b| {
        b.iter(|| {
            rt.block_on(async {
                let customer = CustomerId::new();
                for sku in ["SKU-1", "SKU-7", "SKU-12"] {
                    carts
                        .add_item(customer, ProductId::new(sku), 1)
                        .await
                        .unwrap();
                }
                checkout
                    .checkout(
                        customer,
                        CheckoutRequest {
                            idempotency_key: "bench".into(),
                            shipping_address: address(),
                            payment_method: PaymentMethod::Card,
                            shipping_option: ShippingOption::Standard,
                        },
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_pricing, bench_cart_add, bench_checkout);
criterion_main!(benches);
