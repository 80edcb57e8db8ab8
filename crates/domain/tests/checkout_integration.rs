//! Integration tests for checkout, the order ledger and the vendor gateway.
//!
//! Everything runs against the in-memory event store and catalog.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    Actor, AdvanceFulfillment, Aggregate, CancelOrder, CartStore, Catalog, CatalogError, Checkout,
    CheckoutRequest, Currency, CustomerId, DomainError, InMemoryCatalog, Money, OrderError,
    OrderLedger, OrderStatus, PaymentMethod, PaymentStatus, PricingPolicy, Product, ProductId,
    RecordPayment, ShippingAddress, ShippingOption, VendorGateway, VendorId,
};
use event_store::InMemoryEventStore;

/// Wraps the in-memory catalog with switchable failures.
struct FlakyCatalog {
    inner: InMemoryCatalog,
    fail_decrement_of: Option<ProductId>,
    fail_restock: bool,
}

#[async_trait]
impl Catalog for FlakyCatalog {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, CatalogError> {
        self.inner.get_product(product_id).await
    }

    async fn decrement_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32, CatalogError> {
        if self.fail_decrement_of.as_ref() == Some(product_id) {
            return Err(CatalogError::InsufficientStock {
                product_id: product_id.clone(),
                available: 0,
                requested: quantity,
            });
        }
        self.inner.decrement_stock(product_id, quantity).await
    }

    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<u32, CatalogError> {
        if self.fail_restock {
            return Err(CatalogError::Unavailable("catalog offline".into()));
        }
        self.inner.restock(product_id, quantity).await
    }
}

struct Shop<C: Catalog> {
    store: InMemoryEventStore,
    catalog: Arc<C>,
    carts: Arc<CartStore>,
    ledger: Arc<OrderLedger<InMemoryEventStore>>,
    checkout: Checkout<InMemoryEventStore>,
    vendors: VendorGateway<InMemoryEventStore>,
}

fn shop_with<C: Catalog + 'static>(catalog: C) -> Shop<C> {
    let store = InMemoryEventStore::new();
    let catalog = Arc::new(catalog);
    let carts = Arc::new(CartStore::new(catalog.clone()));
    let ledger = Arc::new(OrderLedger::new(
        store.clone(),
        catalog.clone(),
        PricingPolicy::default(),
        Currency::usd(),
    ));
    Shop {
        checkout: Checkout::new(carts.clone(), ledger.clone()),
        vendors: VendorGateway::new(ledger.clone()),
        store,
        catalog,
        carts,
        ledger,
    }
}

fn product(id: &str, vendor_id: VendorId, price: i64, stock: u32) -> Product {
    Product {
        id: ProductId::new(id),
        vendor_id,
        name: format!("{id} product"),
        price: Money::from_cents(price),
        stock,
        active: true,
    }
}

fn shop(vendor: VendorId) -> Shop<InMemoryCatalog> {
    shop_with(InMemoryCatalog::from_products([
        product("HARNESS", vendor, 10_000, 10),
        product("CATNIP", vendor, 450, 3),
    ]))
}

fn address() -> ShippingAddress {
    ShippingAddress {
        recipient: "Sam Whiskers".into(),
        line1: "12 Tabby Lane".into(),
        line2: None,
        city: "Austin".into(),
        region: Some("TX".into()),
        postal_code: "73301".into(),
        country: "US".into(),
        phone: None,
    }
}

fn request(key: &str) -> CheckoutRequest {
    CheckoutRequest {
        idempotency_key: key.into(),
        shipping_address: address(),
        payment_method: PaymentMethod::Paypal,
        shipping_option: ShippingOption::Standard,
    }
}

async fn stock(catalog: &InMemoryCatalog, id: &str) -> u32 {
    catalog.stock_of(&ProductId::new(id)).await.unwrap()
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn places_priced_order_and_clears_cart() {
        let shop = shop(VendorId::new());
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "HARNESS".into(), 2)
            .await
            .unwrap();

        let placement = shop
            .checkout
            .checkout(customer, request("k-1"))
            .await
            .unwrap();
        let order = placement.order;

        assert!(!placement.replayed);
        assert_eq!(order.status(), OrderStatus::Placed);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.pricing().subtotal, Money::from_cents(20_000));
        assert_eq!(order.pricing().shipping_cost, Money::from_cents(5_999));
        assert_eq!(order.pricing().tax, Money::from_cents(1_600));
        assert_eq!(order.total(), Money::from_cents(27_599));
        assert!(order.order_number().as_str().starts_with("PS-"));
        assert_eq!(order.lines()[0].line_total, Money::from_cents(20_000));

        assert_eq!(stock(&shop.catalog, "HARNESS").await, 8);
        assert!(shop.carts.get(customer).await.is_empty());
    }

    #[tokio::test]
    async fn same_idempotency_key_returns_the_same_order() {
        let shop = shop(VendorId::new());
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "HARNESS".into(), 1)
            .await
            .unwrap();

        let first = shop.checkout.checkout(customer, request("k-1")).await.unwrap();
        let second = shop.checkout.checkout(customer, request("k-1")).await.unwrap();

        assert!(second.replayed);
        assert_eq!(first.order.order_number(), second.order.order_number());
        assert_eq!(stock(&shop.catalog, "HARNESS").await, 9);
        assert_eq!(shop.store.event_count().await, 1);
    }

    #[tokio::test]
    async fn double_submit_with_new_key_sees_empty_cart() {
        let shop = shop(VendorId::new());
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "HARNESS".into(), 1)
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            shop.checkout.checkout(customer, request("k-a")),
            shop.checkout.checkout(customer, request("k-b")),
        );

        let failures: Vec<_> = [&a, &b].into_iter().filter(|r| r.is_err()).collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            Err(DomainError::Order(OrderError::EmptyCart))
        ));
        assert_eq!(stock(&shop.catalog, "HARNESS").await, 9);
    }

    #[tokio::test]
    async fn stock_drop_rejects_without_side_effects() {
        let shop = shop(VendorId::new());
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "CATNIP".into(), 3)
            .await
            .unwrap();
        shop.catalog
            .decrement_stock(&ProductId::new("CATNIP"), 2)
            .await
            .unwrap();

        let err = shop
            .checkout
            .checkout(customer, request("k-1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::StockChanged {
                available: 1,
                requested: 3,
                ..
            })
        ));
        assert_eq!(stock(&shop.catalog, "CATNIP").await, 1);
        assert_eq!(shop.carts.get(customer).await.items[0].quantity, 3);
        assert_eq!(shop.store.event_count().await, 0);
    }

    #[tokio::test]
    async fn deactivated_product_is_unavailable() {
        let vendor = VendorId::new();
        let shop = shop(vendor);
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "CATNIP".into(), 1)
            .await
            .unwrap();
        let mut retired = product("CATNIP", vendor, 450, 3);
        retired.active = false;
        shop.catalog.upsert(retired).await;

        assert!(matches!(
            shop.checkout.checkout(customer, request("k-1")).await,
            Err(DomainError::Order(OrderError::ProductUnavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn validation_failures() {
        let shop = shop(VendorId::new());
        let customer = CustomerId::new();

        assert!(matches!(
            shop.checkout.checkout(customer, request("k-1")).await,
            Err(DomainError::Order(OrderError::EmptyCart))
        ));

        shop.carts
            .add_item(customer, "HARNESS".into(), 1)
            .await
            .unwrap();
        assert!(matches!(
            shop.checkout.checkout(customer, request("  ")).await,
            Err(DomainError::Order(OrderError::MissingIdempotencyKey))
        ));

        let mut bad_address = request("k-2");
        bad_address.shipping_address.postal_code.clear();
        assert!(matches!(
            shop.checkout.checkout(customer, bad_address).await,
            Err(DomainError::Order(OrderError::InvalidShippingAddress {
                field: "postal_code"
            }))
        ));
        assert_eq!(shop.carts.get(customer).await.items.len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_returns_stock() {
        let shop = shop(VendorId::new());
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "HARNESS".into(), 4)
            .await
            .unwrap();
        shop.store.set_fail_appends(true);

        let err = shop
            .checkout
            .checkout(customer, request("k-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::EventStore(_)));
        assert_eq!(stock(&shop.catalog, "HARNESS").await, 10);
        assert_eq!(shop.carts.get(customer).await.items.len(), 1);
    }
}

mod stock_compensation {
    use super::*;

    fn flaky(vendor: VendorId, fail_restock: bool) -> Shop<FlakyCatalog> {
        shop_with(FlakyCatalog {
            inner: InMemoryCatalog::from_products([
                product("HARNESS", vendor, 10_000, 10),
                product("CATNIP", vendor, 450, 3),
            ]),
            fail_decrement_of: Some(ProductId::new("CATNIP")),
            fail_restock,
        })
    }

    #[tokio::test]
    async fn later_line_failure_restocks_earlier_lines() {
        let shop = flaky(VendorId::new(), false);
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "HARNESS".into(), 2)
            .await
            .unwrap();
        shop.carts
            .add_item(customer, "CATNIP".into(), 1)
            .await
            .unwrap();

        let err = shop
            .checkout
            .checkout(customer, request("k-1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::StockChanged { ref product_id, .. })
                if product_id.as_str() == "CATNIP"
        ));
        assert_eq!(stock(&shop.catalog.inner, "HARNESS").await, 10);
        assert_eq!(shop.store.event_count().await, 0);
    }

    #[tokio::test]
    async fn failed_rollback_is_reported() {
        let shop = flaky(VendorId::new(), true);
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "HARNESS".into(), 2)
            .await
            .unwrap();
        shop.carts
            .add_item(customer, "CATNIP".into(), 1)
            .await
            .unwrap();

        let err = shop
            .checkout
            .checkout(customer, request("k-1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::StockRollbackFailed { quantity: 2, .. })
        ));
    }
}

mod cancellation {
    use super::*;

    async fn placed(shop: &Shop<InMemoryCatalog>, customer: CustomerId) -> AggregateId {
        shop.carts
            .add_item(customer, "HARNESS".into(), 3)
            .await
            .unwrap();
        let placement = shop.checkout.checkout(customer, request("k-1")).await.unwrap();
        placement.order.id().unwrap()
    }

    #[tokio::test]
    async fn customer_cancel_restocks_and_fails_payment() {
        let shop = shop(VendorId::new());
        let customer = CustomerId::new();
        let order_id = placed(&shop, customer).await;
        assert_eq!(stock(&shop.catalog, "HARNESS").await, 7);

        let order = shop
            .ledger
            .cancel(CancelOrder::new(order_id, Actor::Customer(customer)).with_reason("oops"))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.payment_status(), PaymentStatus::Failed);
        assert_eq!(stock(&shop.catalog, "HARNESS").await, 10);

        assert!(matches!(
            shop.ledger
                .cancel(CancelOrder::new(order_id, Actor::System))
                .await,
            Err(DomainError::Order(OrderError::InvalidTransition { .. }))
        ));
        assert_eq!(stock(&shop.catalog, "HARNESS").await, 10);
    }

    #[tokio::test]
    async fn only_the_owner_may_cancel() {
        let shop = shop(VendorId::new());
        let order_id = placed(&shop, CustomerId::new()).await;

        assert!(matches!(
            shop.ledger
                .cancel(CancelOrder::new(order_id, Actor::Customer(CustomerId::new())))
                .await,
            Err(DomainError::Order(OrderError::NotAuthorized))
        ));
    }

    #[tokio::test]
    async fn vendor_cancel_is_an_invalid_transition() {
        let vendor = VendorId::new();
        let shop = shop(vendor);
        let order_id = placed(&shop, CustomerId::new()).await;

        assert!(matches!(
            shop.vendors
                .advance(vendor, order_id, OrderStatus::Cancelled)
                .await,
            Err(DomainError::Order(OrderError::InvalidTransition { .. }))
        ));
        assert_eq!(stock(&shop.catalog, "HARNESS").await, 7);
    }

    #[tokio::test]
    async fn unknown_order() {
        let shop = shop(VendorId::new());
        assert!(matches!(
            shop.ledger
                .cancel(CancelOrder::new(AggregateId::new(), Actor::System))
                .await,
            Err(DomainError::Order(OrderError::NotFound(_)))
        ));
    }
}

mod fulfillment {
    use super::*;

    async fn placed(shop: &Shop<InMemoryCatalog>) -> AggregateId {
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "HARNESS".into(), 1)
            .await
            .unwrap();
        let order = shop
            .checkout
            .checkout(customer, request("k-1"))
            .await
            .unwrap()
            .order;
        order.id().unwrap()
    }

    #[tokio::test]
    async fn vendor_ships_and_delivers() {
        let vendor = VendorId::new();
        let shop = shop(vendor);
        let order_id = placed(&shop).await;

        for target in [
            OrderStatus::Confirmed,
            OrderStatus::Packed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let order = shop.vendors.advance(vendor, order_id, target).await.unwrap();
            assert_eq!(order.status(), target);
        }

        let order = shop.ledger.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status_history().len(), 5);
        assert!(matches!(
            shop.vendors
                .advance(vendor, order_id, OrderStatus::Shipped)
                .await,
            Err(DomainError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn cancelled_order_cannot_ship() {
        let vendor = VendorId::new();
        let shop = shop(vendor);
        let order_id = placed(&shop).await;
        shop.ledger
            .cancel(CancelOrder::new(order_id, Actor::System))
            .await
            .unwrap();

        assert!(matches!(
            shop.vendors
                .advance(vendor, order_id, OrderStatus::Shipped)
                .await,
            Err(DomainError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Shipped
            }))
        ));
    }

    #[tokio::test]
    async fn foreign_vendor_and_unknown_order() {
        let shop = shop(VendorId::new());
        let order_id = placed(&shop).await;

        assert!(matches!(
            shop.vendors
                .advance(VendorId::new(), order_id, OrderStatus::Confirmed)
                .await,
            Err(DomainError::Order(OrderError::NotAuthorized))
        ));
        assert!(matches!(
            shop.vendors
                .advance(VendorId::new(), AggregateId::new(), OrderStatus::Confirmed)
                .await,
            Err(DomainError::Order(OrderError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn racing_vendors_only_one_wins() {
        let vendor = VendorId::new();
        let shop = shop(vendor);
        let order_id = placed(&shop).await;

        let (a, b) = tokio::join!(
            shop.vendors.advance(vendor, order_id, OrderStatus::Packed),
            shop.vendors.advance(vendor, order_id, OrderStatus::Packed),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let order = shop.ledger.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status_history().len(), 2);
    }

    #[tokio::test]
    async fn system_cancel_through_advance_restocks() {
        let shop = shop(VendorId::new());
        let order_id = placed(&shop).await;

        let order = shop
            .ledger
            .advance_fulfillment(AdvanceFulfillment::new(
                order_id,
                OrderStatus::Cancelled,
                Actor::System,
            ))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(stock(&shop.catalog, "HARNESS").await, 10);
    }
}

mod payments {
    use super::*;

    #[tokio::test]
    async fn payment_confirms_once() {
        let shop = shop(VendorId::new());
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "HARNESS".into(), 2)
            .await
            .unwrap();
        let order = shop
            .checkout
            .checkout(customer, request("k-1"))
            .await
            .unwrap()
            .order;
        let order_id = order.id().unwrap();
        let intent_id = AggregateId::new();
        let pay = |intent_id| RecordPayment {
            order_id,
            intent_id,
            provider_reference: "PAY-123".into(),
            amount: Money::from_cents(27_599),
        };

        let paid = shop.ledger.record_payment(pay(intent_id)).await.unwrap();
        assert_eq!(paid.payment_status(), PaymentStatus::Paid);
        assert_eq!(paid.status(), OrderStatus::Confirmed);

        let again = shop.ledger.record_payment(pay(intent_id)).await.unwrap();
        assert_eq!(again.status_history(), paid.status_history());

        assert!(matches!(
            shop.ledger.record_payment(pay(AggregateId::new())).await,
            Err(DomainError::Order(OrderError::AlreadyPaid))
        ));
    }
}

mod hydration {
    use super::*;

    #[tokio::test]
    async fn fresh_ledger_finds_orders_after_hydrate() {
        let shop = shop(VendorId::new());
        let customer = CustomerId::new();
        shop.carts
            .add_item(customer, "HARNESS".into(), 1)
            .await
            .unwrap();
        let order = shop
            .checkout
            .checkout(customer, request("k-1"))
            .await
            .unwrap()
            .order;

        let restarted = OrderLedger::new(
            shop.store.clone(),
            shop.catalog.clone(),
            PricingPolicy::default(),
            Currency::usd(),
        );
        assert!(
            restarted
                .find_by_number(order.order_number())
                .await
                .unwrap()
                .is_none()
        );

        assert_eq!(restarted.hydrate().await.unwrap(), 1);
        let found = restarted
            .find_by_number(order.order_number())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.total(), order.total());
        assert!(
            restarted
                .find_by_idempotency_key(customer, "k-1")
                .await
                .unwrap()
                .is_some()
        );
    }
}
