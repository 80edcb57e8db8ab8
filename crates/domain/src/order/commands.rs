//! Order commands.

use common::AggregateId;

use crate::cart::CartSnapshot;
use crate::command::Command;
use crate::pricing::ShippingOption;

use super::{Actor, Money, Order, OrderStatus, PaymentMethod, ShippingAddress};

/// Turns a cart snapshot into a placed order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub snapshot: CartSnapshot,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub shipping_option: ShippingOption,
    /// Client-chosen key; repeating it returns the order it produced.
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub actor: Actor,
    pub reason: Option<String>,
}

impl CancelOrder {
    pub fn new(order_id: AggregateId, actor: Actor) -> Self {
        Self {
            order_id,
            actor,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl Command for CancelOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

#[derive(Debug, Clone)]
pub struct AdvanceFulfillment {
    pub order_id: AggregateId,
    pub target: OrderStatus,
    pub actor: Actor,
}

impl AdvanceFulfillment {
    pub fn new(order_id: AggregateId, target: OrderStatus, actor: Actor) -> Self {
        Self {
            order_id,
            target,
            actor,
        }
    }
}

impl Command for AdvanceFulfillment {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Issued by payment reconciliation once the provider confirmed a payment.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub order_id: AggregateId,
    pub intent_id: AggregateId,
    pub provider_reference: String,
    pub amount: Money,
}

impl Command for RecordPayment {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}
