//! Shared application state.

use std::sync::Arc;

use domain::{Catalog, CartStore, Checkout, OrderLedger, VendorGateway};
use event_store::EventStore;
use payments::{PaymentCoordinator, PaymentProvider};
use projections::{CustomerOrdersView, ProjectionProcessor, VendorOrdersView};

use crate::config::Config;

/// Services behind every handler.
pub struct AppState<S: EventStore> {
    pub carts: Arc<CartStore>,
    pub ledger: Arc<OrderLedger<S>>,
    pub checkout: Checkout<S>,
    pub vendors: VendorGateway<S>,
    pub payments: Arc<PaymentCoordinator<S>>,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
    pub customer_orders: CustomerOrdersView,
    pub vendor_orders: VendorOrdersView,
}

impl<S: EventStore + Clone + 'static> AppState<S> {
    /// Wires the services over one event store, catalog and provider.
    pub fn new(
        store: S,
        catalog: Arc<dyn Catalog>,
        provider: Arc<dyn PaymentProvider>,
        config: &Config,
    ) -> Self {
        let carts = Arc::new(CartStore::new(catalog.clone()));
        let ledger = Arc::new(OrderLedger::new(
            store.clone(),
            catalog,
            config.pricing,
            config.currency.clone(),
        ));
        let payments = Arc::new(PaymentCoordinator::new(
            store.clone(),
            ledger.clone(),
            provider,
            config.coordinator_settings(),
        ));

        let customer_orders = CustomerOrdersView::new();
        let vendor_orders = VendorOrdersView::new();
        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(customer_orders.clone()));
        processor.register(Box::new(vendor_orders.clone()));

        Self {
            checkout: Checkout::new(carts.clone(), ledger.clone()),
            vendors: VendorGateway::new(ledger.clone()),
            carts,
            ledger,
            payments,
            projection_processor: Arc::new(processor),
            customer_orders,
            vendor_orders,
        }
    }

    /// Rebuilds lookup indexes and read models from the event log.
    pub async fn hydrate(&self) -> Result<(), crate::error::ApiError> {
        let orders = self.ledger.hydrate().await?;
        let intents = self.payments.hydrate().await?;
        self.projection_processor.run_catch_up().await?;
        tracing::info!(orders, intents, "state hydrated from event log");
        Ok(())
    }
}
