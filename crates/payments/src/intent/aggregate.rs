//! PaymentIntent aggregate.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, Currency, Money, OrderNumber};
use event_store::Version;
use serde::{Deserialize, Serialize};

use super::events::{
    IntentCreatedData, IntentEvent, IntentFailedData, IntentResolvedData, IntentVerifiedData,
    ProviderLinkedData,
};
use super::state::IntentStatus;
use crate::error::PaymentError;

/// One attempt to pay one order through the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentIntent {
    id: Option<AggregateId>,
    version: Version,
    order_id: Option<AggregateId>,
    order_number: OrderNumber,
    provider_reference: Option<String>,
    approval_url: Option<String>,
    amount: Money,
    currency: Currency,
    status: IntentStatus,
    payer_reference: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl Aggregate for PaymentIntent {
    type Event = IntentEvent;
    type Error = PaymentError;

    fn aggregate_type() -> &'static str {
        "PaymentIntent"
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
            IntentEvent::IntentCreated(data) => {
                self.id = Some(data.intent_id);
                self.order_id = Some(data.order_id);
                self.order_number = data.order_number;
                self.amount = data.amount;
                self.currency = data.currency;
                self.status = IntentStatus::Created;
                self.created_at = data.created_at;
            }
            IntentEvent::ProviderLinked(data) => {
                self.provider_reference = Some(data.provider_reference);
                self.approval_url = Some(data.approval_url);
            }
            IntentEvent::IntentVerified(data) => {
                self.status = IntentStatus::Verified;
                self.payer_reference = Some(data.payer_reference);
                self.resolved_at = Some(data.verified_at);
            }
            IntentEvent::IntentFailed(data) => {
                self.status = IntentStatus::Failed;
                self.failure_reason = Some(data.reason);
                self.resolved_at = Some(data.failed_at);
            }
            IntentEvent::IntentCancelled(data) => {
                self.status = IntentStatus::Cancelled;
                self.resolved_at = Some(data.at);
            }
            IntentEvent::IntentExpired(data) => {
                self.status = IntentStatus::Expired;
                self.resolved_at = Some(data.at);
            }
        }
    }
}

impl PaymentIntent {
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn provider_reference(&self) -> Option<&str> {
        self.provider_reference.as_deref()
    }

    pub fn approval_url(&self) -> Option<&str> {
        self.approval_url.as_deref()
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn status(&self) -> IntentStatus {
        self.status
    }

    pub fn payer_reference(&self) -> Option<&str> {
        self.payer_reference.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// True when the intent is still open but the provider never confirmed it.
    pub fn is_in_flight(&self) -> bool {
        self.status == IntentStatus::Created && self.provider_reference.is_none()
    }
}

// Commands
impl PaymentIntent {
    pub fn create(&self, data: IntentCreatedData) -> Result<Vec<IntentEvent>, PaymentError> {
        if self.id.is_some() {
            return Err(PaymentError::IntentAlreadyCreated);
        }
        Ok(vec![IntentEvent::IntentCreated(data)])
    }

    pub fn link_provider(
        &self,
        provider_reference: String,
        approval_url: String,
        now: DateTime<Utc>,
    ) -> Result<Vec<IntentEvent>, PaymentError> {
        self.ensure_open()?;
        if self.provider_reference.as_deref() == Some(provider_reference.as_str()) {
            return Ok(vec![]);
        }
        Ok(vec![IntentEvent::ProviderLinked(ProviderLinkedData {
            provider_reference,
            approval_url,
            linked_at: now,
        })])
    }

    pub fn verify(
        &self,
        payer_reference: String,
        now: DateTime<Utc>,
    ) -> Result<Vec<IntentEvent>, PaymentError> {
        self.ensure_open()?;
        Ok(vec![IntentEvent::IntentVerified(IntentVerifiedData {
            payer_reference,
            verified_at: now,
        })])
    }

    pub fn fail(
        &self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<IntentEvent>, PaymentError> {
        self.ensure_open()?;
        Ok(vec![IntentEvent::IntentFailed(IntentFailedData {
            reason: reason.into(),
            failed_at: now,
        })])
    }

    pub fn cancel(&self, now: DateTime<Utc>) -> Result<Vec<IntentEvent>, PaymentError> {
        self.ensure_open()?;
        Ok(vec![IntentEvent::IntentCancelled(IntentResolvedData {
            at: now,
        })])
    }

    pub fn expire(&self, now: DateTime<Utc>) -> Result<Vec<IntentEvent>, PaymentError> {
        self.ensure_open()?;
        Ok(vec![IntentEvent::IntentExpired(IntentResolvedData { at: now })])
    }

    fn ensure_open(&self) -> Result<(), PaymentError> {
        if self.status.is_terminal() {
            return Err(PaymentError::IntentClosed {
                status: self.status,
            });
        }
        Ok(())
    }
}
