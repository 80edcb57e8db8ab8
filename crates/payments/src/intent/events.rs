//! Payment intent events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Currency, DomainEvent, Money, OrderNumber};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum IntentEvent {
    IntentCreated(IntentCreatedData),

    /// The provider accepted the intent and handed back its reference.
    ProviderLinked(ProviderLinkedData),

    IntentVerified(IntentVerifiedData),

    IntentFailed(IntentFailedData),

    IntentCancelled(IntentResolvedData),

    /// Nobody completed the intent before its time to live ran out.
    IntentExpired(IntentResolvedData),
}

impl DomainEvent for IntentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            IntentEvent::IntentCreated(_) => "IntentCreated",
            IntentEvent::ProviderLinked(_) => "ProviderLinked",
            IntentEvent::IntentVerified(_) => "IntentVerified",
            IntentEvent::IntentFailed(_) => "IntentFailed",
            IntentEvent::IntentCancelled(_) => "IntentCancelled",
            IntentEvent::IntentExpired(_) => "IntentExpired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentCreatedData {
    pub intent_id: AggregateId,
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub amount: Money,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLinkedData {
    pub provider_reference: String,
    pub approval_url: String,
    pub linked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentVerifiedData {
    pub payer_reference: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResolvedData {
    pub at: DateTime<Utc>,
}
