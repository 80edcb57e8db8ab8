//! Payment error types.

use common::AggregateId;
use domain::{Currency, DomainError, Money, OrderStatus};
use event_store::EventStoreError;
use thiserror::Error;

use crate::intent::IntentStatus;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Order not found: {0}")]
    OrderNotFound(AggregateId),

    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Order cannot be paid in status {status}")]
    OrderNotPayable { status: OrderStatus },

    #[error("Currency {actual} does not match order currency {expected}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    #[error("Amount {actual} does not match order total {expected}")]
    AmountMismatch { expected: Money, actual: Money },

    /// An intent exists whose provider call outcome is still unknown.
    #[error("A payment for this order is already in flight (intent {0})")]
    PaymentInFlight(AggregateId),

    #[error("Payment provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("Payment provider rejected the payment: {0}")]
    ProviderRejected(String),

    #[error("Unknown provider reference: {0}")]
    UnknownProviderReference(String),

    #[error("Approved callback is missing the payer reference")]
    MissingPayerReference,

    #[error("Payment intent not found: {0}")]
    IntentNotFound(AggregateId),

    #[error("Payment intent already exists")]
    IntentAlreadyCreated,

    #[error("Payment intent is already {status}")]
    IntentClosed { status: IntentStatus },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PaymentError {
    /// True when the provider could not be reached and the same request
    /// may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::ProviderUnreachable(_))
    }
}
