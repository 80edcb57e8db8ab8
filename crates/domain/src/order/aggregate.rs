//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::pricing::{PriceBreakdown, ShippingOption};

use super::events::{
    FulfillmentAdvancedData, OrderCancelledData, OrderPlacedData, PaymentRecordedData,
};
use super::{
    Actor, Currency, CustomerId, Money, OrderError, OrderEvent, OrderLine, OrderNumber,
    OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress, VendorId,
};

/// One entry of an order's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// `None` for the initial placement.
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

/// The payment that settled an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub intent_id: AggregateId,
    pub provider_reference: String,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}

/// Order aggregate root.
///
/// Everything captured at placement is immutable; only `status` and
/// `payment_status` move afterwards, each through its own state machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_number: OrderNumber,
    customer_id: Option<CustomerId>,
    idempotency_key: String,
    lines: Vec<OrderLine>,
    shipping_address: ShippingAddress,
    shipping_option: ShippingOption,
    payment_method: PaymentMethod,
    pricing: PriceBreakdown,
    currency: Currency,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment: Option<PaymentRecord>,
    status_history: Vec<StatusChange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_placed(data),
            OrderEvent::FulfillmentAdvanced(data) => self.apply_advanced(data),
            OrderEvent::PaymentRecorded(data) => self.apply_payment(data),
            OrderEvent::OrderCancelled(data) => self.apply_cancelled(data),
        }
    }
}

// Queries
impl Order {
    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn shipping_option(&self) -> ShippingOption {
        self.shipping_option
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn pricing(&self) -> &PriceBreakdown {
        &self.pricing
    }

    pub fn total(&self) -> Money {
        self.pricing.total
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment(&self) -> Option<&PaymentRecord> {
        self.payment.as_ref()
    }

    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_owned_by(&self, customer_id: CustomerId) -> bool {
        self.customer_id == Some(customer_id)
    }

    /// Whether `vendor_id` sells at least one line of this order.
    pub fn involves_vendor(&self, vendor_id: VendorId) -> bool {
        self.lines.iter().any(|line| line.vendor_id == vendor_id)
    }
}

// Commands
impl Order {
    pub fn place(&self, data: OrderPlacedData) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        if data.lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        Ok(vec![OrderEvent::OrderPlaced(data)])
    }

    /// Moves fulfillment forward. A `Cancelled` target is handled by
    /// [`Order::cancel`].
    pub fn advance(
        &self,
        target: OrderStatus,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if target == OrderStatus::Cancelled {
            return self.cancel(actor, None, now);
        }

        let allowed = match actor {
            Actor::Vendor(_) => self.status.vendor_can_set(target),
            Actor::System => self.status.can_transition_to(target),
            Actor::Customer(_) => return Err(OrderError::NotAuthorized),
        };
        if !allowed {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        Ok(vec![OrderEvent::FulfillmentAdvanced(
            FulfillmentAdvancedData {
                from: self.status,
                to: target,
                actor,
                at: now,
            },
        )])
    }

    pub fn cancel(
        &self,
        actor: Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let allowed = match actor {
            Actor::Customer(customer_id) => {
                if !self.is_owned_by(customer_id) {
                    return Err(OrderError::NotAuthorized);
                }
                self.status.customer_can_cancel()
            }
            Actor::System => self.status.can_transition_to(OrderStatus::Cancelled),
            Actor::Vendor(_) => false,
        };
        if !allowed {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Cancelled,
            });
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelledData {
            from: self.status,
            actor,
            reason,
            payment_failed: self.payment_status == PaymentStatus::Pending,
            cancelled_at: now,
        })])
    }

    /// Marks the order paid. Repeating the call for the same intent records
    /// nothing.
    pub fn record_payment(
        &self,
        intent_id: AggregateId,
        provider_reference: impl Into<String>,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if let Some(payment) = &self.payment {
            return if payment.intent_id == intent_id {
                Ok(vec![])
            } else {
                Err(OrderError::AlreadyPaid)
            };
        }
        if self.status == OrderStatus::Cancelled {
            return Err(OrderError::NotPayable {
                status: self.status,
            });
        }
        if amount != self.pricing.total {
            return Err(OrderError::PaymentAmountMismatch {
                expected: self.pricing.total,
                actual: amount,
            });
        }

        Ok(vec![OrderEvent::PaymentRecorded(PaymentRecordedData {
            intent_id,
            provider_reference: provider_reference.into(),
            amount,
            confirmed: self.status == OrderStatus::Placed,
            recorded_at: now,
        })])
    }
}

// Apply helpers
impl Order {
    fn apply_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.order_number = data.order_number;
        self.customer_id = Some(data.customer_id);
        self.idempotency_key = data.idempotency_key;
        self.lines = data.lines;
        self.shipping_address = data.shipping_address;
        self.shipping_option = data.shipping_option;
        self.payment_method = data.payment_method;
        self.pricing = data.pricing;
        self.currency = data.currency;
        self.status = OrderStatus::Placed;
        self.payment_status = PaymentStatus::Pending;
        self.status_history = vec![StatusChange {
            from: None,
            to: OrderStatus::Placed,
            actor: Actor::Customer(data.customer_id),
            at: data.placed_at,
        }];
        self.created_at = data.placed_at;
        self.updated_at = data.placed_at;
    }

    fn apply_advanced(&mut self, data: FulfillmentAdvancedData) {
        self.transition(data.to, data.actor, data.at);
    }

    fn apply_payment(&mut self, data: PaymentRecordedData) {
        self.payment_status = PaymentStatus::Paid;
        self.payment = Some(PaymentRecord {
            intent_id: data.intent_id,
            provider_reference: data.provider_reference,
            amount: data.amount,
            paid_at: data.recorded_at,
        });
        if data.confirmed {
            self.transition(OrderStatus::Confirmed, Actor::System, data.recorded_at);
        }
        self.updated_at = data.recorded_at;
    }

    fn apply_cancelled(&mut self, data: OrderCancelledData) {
        if data.payment_failed {
            self.payment_status = PaymentStatus::Failed;
        }
        self.transition(OrderStatus::Cancelled, data.actor, data.cancelled_at);
    }

    fn transition(&mut self, to: OrderStatus, actor: Actor, at: DateTime<Utc>) {
        self.status_history.push(StatusChange {
            from: Some(self.status),
            to,
            actor,
            at,
        });
        self.status = to;
        self.updated_at = at;
    }
}
