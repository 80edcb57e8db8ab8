//! Checkout: cart snapshot → order, then clear the cart.

use std::sync::Arc;

use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::cart::CartStore;
use crate::error::DomainError;
use crate::order::{
    CreateOrder, CustomerId, OrderError, OrderLedger, PaymentMethod, Placement, ShippingAddress,
};
use crate::pricing::ShippingOption;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub idempotency_key: String,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub shipping_option: ShippingOption,
}

/// Places orders from carts.
///
/// The customer's cart stays locked from snapshot until it is cleared, so a
/// double submit either sees the cleared cart or, with the same idempotency
/// key, gets the order the first submit created.
pub struct Checkout<S: EventStore> {
    carts: Arc<CartStore>,
    ledger: Arc<OrderLedger<S>>,
}

impl<S: EventStore> Checkout<S> {
    pub fn new(carts: Arc<CartStore>, ledger: Arc<OrderLedger<S>>) -> Self {
        Self { carts, ledger }
    }

    #[tracing::instrument(skip(self, request), fields(idempotency_key = %request.idempotency_key))]
    pub async fn checkout(
        &self,
        customer_id: CustomerId,
        request: CheckoutRequest,
    ) -> Result<Placement, DomainError> {
        let result = self.place(customer_id, request).await;
        if let Err(err) = &result {
            metrics::counter!("checkout_failures_total").increment(1);
            tracing::info!(error = %err, "checkout rejected");
        }
        result
    }

    async fn place(
        &self,
        customer_id: CustomerId,
        request: CheckoutRequest,
    ) -> Result<Placement, DomainError> {
        if request.idempotency_key.trim().is_empty() {
            return Err(OrderError::MissingIdempotencyKey.into());
        }

        let mut cart = self.carts.lock(customer_id).await;

        let placement = self
            .ledger
            .create_order(CreateOrder {
                snapshot: cart.snapshot(),
                shipping_address: request.shipping_address,
                payment_method: request.payment_method,
                shipping_option: request.shipping_option,
                idempotency_key: request.idempotency_key,
            })
            .await?;

        if !placement.replayed {
            cart.clear();
        }
        Ok(placement)
    }
}
