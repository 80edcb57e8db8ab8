//! Vendor-facing fulfillment updates.

use std::sync::Arc;

use common::AggregateId;
use event_store::EventStore;

use crate::error::DomainError;
use crate::order::{AdvanceFulfillment, Actor, Order, OrderError, OrderLedger, OrderStatus, VendorId};

/// Lets a vendor advance orders containing their products.
pub struct VendorGateway<S: EventStore> {
    ledger: Arc<OrderLedger<S>>,
}

impl<S: EventStore> VendorGateway<S> {
    pub fn new(ledger: Arc<OrderLedger<S>>) -> Self {
        Self { ledger }
    }

    /// Requests `target` on behalf of `vendor_id`, who must sell at least one
    /// line of the order. Only vendor-actionable transitions are accepted.
    #[tracing::instrument(skip(self))]
    pub async fn advance(
        &self,
        vendor_id: VendorId,
        order_id: AggregateId,
        target: OrderStatus,
    ) -> Result<Order, DomainError> {
        let order = self
            .ledger
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;

        if !order.involves_vendor(vendor_id) {
            tracing::warn!(%order_id, %vendor_id, "vendor does not sell in this order");
            return Err(OrderError::NotAuthorized.into());
        }

        self.ledger
            .advance_fulfillment(AdvanceFulfillment::new(
                order_id,
                target,
                Actor::Vendor(vendor_id),
            ))
            .await
    }
}
