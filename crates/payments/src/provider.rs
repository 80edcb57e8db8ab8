//! Payment provider port and a configurable fake.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use domain::{Currency, Money};
use thiserror::Error;

/// What the provider hands back for a new intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIntent {
    pub provider_reference: String,
    /// Where the customer approves the payment.
    pub approval_url: String,
}

/// Outcome of asking the provider whether an approved payment is real.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Approved,
    Rejected { reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Timeouts, connection failures and 5xx answers.
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unreachable(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Unreachable(_) => "unreachable",
            ProviderError::Rejected(_) => "rejected",
        }
    }
}

/// An external payment provider such as PayPal or a card gateway.
///
/// `reference` is our intent id. Providers treat it as an idempotency key,
/// so repeating `create_intent` after a timeout does not open a second
/// payment.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_intent(
        &self,
        amount: Money,
        currency: &Currency,
        reference: &str,
    ) -> Result<ProviderIntent, ProviderError>;

    async fn verify_intent(
        &self,
        provider_reference: &str,
        payer_reference: &str,
    ) -> Result<Verification, ProviderError>;
}

#[derive(Debug, Default)]
struct FakeState {
    intents: HashMap<String, ProviderIntent>,
    next_id: u32,
    unreachable: bool,
    fail_next: u32,
    reject_creation: bool,
    reject_verification: bool,
    latency: Duration,
    create_calls: u32,
    verify_calls: u32,
}

/// In-memory provider used by tests and the default server.
///
/// Every knob can be flipped while the provider is shared.
#[derive(Debug, Clone, Default)]
pub struct FakePaymentProvider {
    state: Arc<Mutex<FakeState>>,
}

impl FakePaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call fails as unreachable while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// The next `calls` calls fail as unreachable, then the provider recovers.
    pub fn fail_next(&self, calls: u32) {
        self.state().fail_next = calls;
    }

    pub fn set_reject_creation(&self, reject: bool) {
        self.state().reject_creation = reject;
    }

    pub fn set_reject_verification(&self, reject: bool) {
        self.state().reject_verification = reject;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub fn create_calls(&self) -> u32 {
        self.state().create_calls
    }

    pub fn verify_calls(&self) -> u32 {
        self.state().verify_calls
    }

    /// Counts the call and applies latency and unreachability.
    async fn enter(&self, count: fn(&mut FakeState)) -> Result<(), ProviderError> {
        let latency = {
            let mut state = self.state();
            count(&mut state);
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if state.unreachable {
            return Err(ProviderError::Unreachable("connection refused".into()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ProviderError::Unreachable("503 service unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    async fn create_intent(
        &self,
        amount: Money,
        currency: &Currency,
        reference: &str,
    ) -> Result<ProviderIntent, ProviderError> {
        self.enter(|state| state.create_calls += 1).await?;

        let mut state = self.state();
        if state.reject_creation {
            return Err(ProviderError::Rejected(format!(
                "payment of {amount} {currency} declined"
            )));
        }
        if let Some(existing) = state.intents.get(reference) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let provider_reference = format!("PAYID-{:06}", state.next_id);
        let intent = ProviderIntent {
            approval_url: format!("https://sandbox.pay.example/checkout?token={provider_reference}"),
            provider_reference,
        };
        state.intents.insert(reference.to_string(), intent.clone());
        Ok(intent)
    }

    async fn verify_intent(
        &self,
        provider_reference: &str,
        payer_reference: &str,
    ) -> Result<Verification, ProviderError> {
        self.enter(|state| state.verify_calls += 1).await?;

        let state = self.state();
        let known = state
            .intents
            .values()
            .any(|intent| intent.provider_reference == provider_reference);
        if !known {
            return Ok(Verification::Rejected {
                reason: format!("unknown payment {provider_reference}"),
            });
        }
        if state.reject_verification {
            return Ok(Verification::Rejected {
                reason: format!("payer {payer_reference} declined"),
            });
        }
        Ok(Verification::Approved)
    }
}
