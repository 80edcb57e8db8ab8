//! Order domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::pricing::{PriceBreakdown, ShippingOption};

use super::{
    Actor, Currency, CustomerId, Money, OrderLine, OrderNumber, OrderStatus, PaymentMethod,
    ShippingAddress,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderPlaced(OrderPlacedData),

    /// A forward fulfillment step, requested by a vendor or the system.
    FulfillmentAdvanced(FulfillmentAdvancedData),

    PaymentRecorded(PaymentRecordedData),

    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::FulfillmentAdvanced(_) => "FulfillmentAdvanced",
            OrderEvent::PaymentRecorded(_) => "PaymentRecorded",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub idempotency_key: String,
    pub lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub shipping_option: ShippingOption,
    pub payment_method: PaymentMethod,
    pub pricing: PriceBreakdown,
    pub currency: Currency,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentAdvancedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecordedData {
    pub intent_id: AggregateId,
    pub provider_reference: String,
    pub amount: Money,
    /// Set when the order was still `Placed` and moved to `Confirmed`.
    pub confirmed: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub from: OrderStatus,
    pub actor: Actor,
    #[serde(default)]
    pub reason: Option<String>,
    /// Set when a still pending payment was written off.
    pub payment_failed: bool,
    pub cancelled_at: DateTime<Utc>,
}
