//! Payment coordinator.
//!
//! Bridges orders to the payment provider. Intent creation is serialized per
//! order and callbacks per intent, so a payment is recorded on its order at
//! most once however often the provider repeats itself.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use common::{AggregateId, KeyedLocks};
use domain::{
    Aggregate, Currency, DomainError, DomainEvent, Money, OrderError, OrderLedger, OrderStatus,
    PaymentStatus, RecordPayment,
};
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};
use serde::{Deserialize, Serialize};

use crate::error::PaymentError;
use crate::intent::events::IntentCreatedData;
use crate::intent::{IntentEvent, IntentStatus, PaymentIntent};
use crate::provider::{PaymentProvider, ProviderError, Verification};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    pub retry: RetryPolicy,
    /// `CREATED` intents older than this are expired.
    pub intent_ttl: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            intent_ttl: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentIntent {
    pub order_id: AggregateId,
    pub amount: Money,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackOutcome {
    Approved,
    Cancelled,
    Failed,
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Approved => "APPROVED",
            CallbackOutcome::Cancelled => "CANCELLED",
            CallbackOutcome::Failed => "FAILED",
        }
    }
}

/// A provider's notification about one of our intents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCallback {
    pub provider_reference: String,
    pub outcome: CallbackOutcome,
    /// Required for `APPROVED`.
    #[serde(default)]
    pub payer_reference: Option<String>,
}

/// Result of handling a callback. `replayed` is set when the intent was
/// already resolved and nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackReceipt {
    pub intent_id: AggregateId,
    pub order_id: AggregateId,
    pub provider_reference: String,
    pub status: IntentStatus,
    pub replayed: bool,
}

#[derive(Debug, Default)]
struct IntentIndex {
    by_reference: HashMap<String, AggregateId>,
    by_order: HashMap<AggregateId, Vec<AggregateId>>,
    /// Intents still `CREATED`, with their creation time.
    open: HashMap<AggregateId, DateTime<Utc>>,
}

impl IntentIndex {
    fn track(&mut self, intent: &PaymentIntent) {
        let Some(intent_id) = intent.id() else {
            return;
        };
        if let Some(order_id) = intent.order_id() {
            let intents = self.by_order.entry(order_id).or_default();
            if !intents.contains(&intent_id) {
                intents.push(intent_id);
            }
        }
        if let Some(reference) = intent.provider_reference() {
            self.by_reference.insert(reference.to_string(), intent_id);
        }
        if intent.status().is_terminal() {
            self.open.remove(&intent_id);
        } else {
            self.open.insert(intent_id, intent.created_at());
        }
    }
}

pub struct PaymentCoordinator<S: EventStore> {
    store: S,
    ledger: Arc<OrderLedger<S>>,
    provider: Arc<dyn PaymentProvider>,
    settings: CoordinatorSettings,
    order_locks: KeyedLocks<AggregateId>,
    intent_locks: KeyedLocks<AggregateId>,
    index: RwLock<IntentIndex>,
}

impl<S: EventStore> PaymentCoordinator<S> {
    pub fn new(
        store: S,
        ledger: Arc<OrderLedger<S>>,
        provider: Arc<dyn PaymentProvider>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            provider,
            settings,
            order_locks: KeyedLocks::new(),
            intent_locks: KeyedLocks::new(),
            index: RwLock::new(IntentIndex::default()),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Rebuilds the reference and per-order indexes from the event log.
    pub async fn hydrate(&self) -> Result<usize, PaymentError> {
        let created = self.store.get_events_by_type("IntentCreated").await?;
        let mut count = 0;
        for envelope in created {
            if let Some(intent) = self.load(envelope.aggregate_id).await? {
                self.index_mut().track(&intent);
                count += 1;
            }
        }
        tracing::info!(intents = count, "payment intent index rebuilt");
        Ok(count)
    }

    /// Opens an intent for an unpaid order and returns it with the
    /// provider's approval URL.
    ///
    /// An open intent that already carries a provider reference is handed
    /// back unchanged. One whose provider call never completed is sent to
    /// the provider again under the same reference; if the provider is
    /// still unreachable the call fails with `PaymentInFlight`.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn create_payment_intent(
        &self,
        cmd: CreatePaymentIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        let _order_guard = self.order_locks.lock(&cmd.order_id).await;

        let order = self
            .ledger
            .get_order(cmd.order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(cmd.order_id))?;

        if order.payment_status() == PaymentStatus::Paid {
            return Err(PaymentError::AlreadyPaid);
        }
        if order.status() == OrderStatus::Cancelled {
            return Err(PaymentError::OrderNotPayable {
                status: order.status(),
            });
        }
        if &cmd.currency != order.currency() {
            return Err(PaymentError::CurrencyMismatch {
                expected: order.currency().clone(),
                actual: cmd.currency,
            });
        }
        if cmd.amount != order.total() {
            return Err(PaymentError::AmountMismatch {
                expected: order.total(),
                actual: cmd.amount,
            });
        }

        if let Some((open_id, open)) = self.open_intent_for(cmd.order_id).await? {
            if !open.is_in_flight() {
                tracing::info!(
                    provider_reference = open.provider_reference(),
                    "returning open payment intent"
                );
                return Ok(open);
            }

            let _intent_guard = self.intent_locks.lock(&open_id).await;
            // The sweeper may have expired it while we waited for the lock.
            if let Some(open) = self.load(open_id).await?
                && open.status() == IntentStatus::Created
            {
                if !open.is_in_flight() {
                    return Ok(open);
                }
                tracing::info!(intent_id = %open_id, "re-sending in-flight payment intent to provider");
                return match self.link_with_provider(open_id, &open).await {
                    Err(PaymentError::ProviderUnreachable(_)) => {
                        Err(PaymentError::PaymentInFlight(open_id))
                    }
                    other => other,
                };
            }
        }

        let intent_id = AggregateId::new();
        let _intent_guard = self.intent_locks.lock(&intent_id).await;
        let now = Utc::now();
        let intent = self
            .execute(intent_id, |intent| {
                intent.create(IntentCreatedData {
                    intent_id,
                    order_id: cmd.order_id,
                    order_number: order.order_number().clone(),
                    amount: cmd.amount,
                    currency: cmd.currency.clone(),
                    created_at: now,
                })
            })
            .await?;
        metrics::counter!("payment_intents_created_total").increment(1);

        self.link_with_provider(intent_id, &intent).await
    }

    /// Registers the intent with the provider, using the intent id as the
    /// idempotency reference, and records the outcome.
    ///
    /// Unreachable leaves the intent open without a provider reference.
    async fn link_with_provider(
        &self,
        intent_id: AggregateId,
        intent: &PaymentIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        let reference = intent_id.to_string();
        let created = self
            .settings
            .retry
            .run("create_intent", || {
                self.provider
                    .create_intent(intent.amount(), intent.currency(), &reference)
            })
            .await;

        match created {
            Ok(linked) => {
                let intent = self
                    .execute(intent_id, |intent| {
                        intent.link_provider(
                            linked.provider_reference,
                            linked.approval_url,
                            Utc::now(),
                        )
                    })
                    .await?;
                tracing::info!(
                    %intent_id,
                    provider_reference = intent.provider_reference(),
                    amount = %intent.amount(),
                    "payment intent created"
                );
                Ok(intent)
            }
            Err(ProviderError::Rejected(reason)) => {
                tracing::warn!(%intent_id, %reason, "provider rejected payment intent");
                self.execute(intent_id, |intent| intent.fail(reason.clone(), Utc::now()))
                    .await?;
                Err(PaymentError::ProviderRejected(reason))
            }
            Err(ProviderError::Unreachable(reason)) => {
                tracing::warn!(%intent_id, %reason, "provider unreachable, intent left open");
                Err(PaymentError::ProviderUnreachable(reason))
            }
        }
    }

    /// Applies a provider callback.
    ///
    /// Callbacks for an intent that is already resolved return the recorded
    /// result with `replayed` set.
    #[tracing::instrument(
        skip(self, callback),
        fields(provider_reference = %callback.provider_reference, outcome = callback.outcome.as_str())
    )]
    pub async fn handle_provider_callback(
        &self,
        callback: ProviderCallback,
    ) -> Result<CallbackReceipt, PaymentError> {
        metrics::counter!("payment_callbacks_total", "outcome" => callback.outcome.as_str())
            .increment(1);

        let intent_id = self
            .index()
            .by_reference
            .get(&callback.provider_reference)
            .copied()
            .ok_or_else(|| {
                PaymentError::UnknownProviderReference(callback.provider_reference.clone())
            })?;

        let _guard = self.intent_locks.lock(&intent_id).await;
        let intent = self
            .load(intent_id)
            .await?
            .ok_or(PaymentError::IntentNotFound(intent_id))?;

        if intent.status().is_terminal() {
            metrics::counter!("payment_callbacks_replayed_total").increment(1);
            tracing::info!(%intent_id, status = %intent.status(), "callback for resolved intent replayed");
            return receipt(intent_id, &intent, &callback.provider_reference, true);
        }

        let resolved = match callback.outcome {
            CallbackOutcome::Approved => {
                let payer_reference = callback
                    .payer_reference
                    .as_deref()
                    .map(str::trim)
                    .filter(|payer| !payer.is_empty())
                    .ok_or(PaymentError::MissingPayerReference)?
                    .to_string();
                self.verify_and_record(
                    intent_id,
                    &intent,
                    &callback.provider_reference,
                    payer_reference,
                )
                .await?
            }
            CallbackOutcome::Cancelled => {
                self.execute(intent_id, |intent| intent.cancel(Utc::now()))
                    .await?
            }
            CallbackOutcome::Failed => {
                self.execute(intent_id, |intent| {
                    intent.fail("provider reported the payment as failed", Utc::now())
                })
                .await?
            }
        };

        tracing::info!(%intent_id, status = %resolved.status(), "payment callback applied");
        receipt(intent_id, &resolved, &callback.provider_reference, false)
    }

    /// Confirms an approval with the provider, then records the payment on
    /// the order before marking the intent verified.
    async fn verify_and_record(
        &self,
        intent_id: AggregateId,
        intent: &PaymentIntent,
        provider_reference: &str,
        payer_reference: String,
    ) -> Result<PaymentIntent, PaymentError> {
        let order_id = intent
            .order_id()
            .ok_or(PaymentError::IntentNotFound(intent_id))?;

        let verification = self
            .settings
            .retry
            .run("verify_intent", || {
                self.provider
                    .verify_intent(provider_reference, &payer_reference)
            })
            .await;

        let reason = match verification {
            Ok(Verification::Approved) => {
                let recorded = self
                    .ledger
                    .record_payment(RecordPayment {
                        order_id,
                        intent_id,
                        provider_reference: provider_reference.to_string(),
                        amount: intent.amount(),
                    })
                    .await;
                match recorded {
                    Ok(order) => {
                        tracing::info!(
                            order_number = %order.order_number(),
                            status = %order.status(),
                            "payment recorded on order"
                        );
                        return self
                            .execute(intent_id, |intent| {
                                intent.verify(payer_reference, Utc::now())
                            })
                            .await;
                    }
                    Err(DomainError::Order(
                        err @ (OrderError::NotPayable { .. }
                        | OrderError::AlreadyPaid
                        | OrderError::PaymentAmountMismatch { .. }),
                    )) => {
                        tracing::error!(
                            %order_id,
                            %intent_id,
                            error = %err,
                            "approved payment cannot be applied, refund required"
                        );
                        err.to_string()
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Ok(Verification::Rejected { reason }) | Err(ProviderError::Rejected(reason)) => {
                tracing::warn!(%intent_id, %reason, "provider rejected payment verification");
                reason
            }
            Err(ProviderError::Unreachable(reason)) => {
                tracing::warn!(%intent_id, %reason, "verification unreachable, intent left open");
                return Err(PaymentError::ProviderUnreachable(reason));
            }
        };

        self.execute(intent_id, |intent| intent.fail(reason, Utc::now()))
            .await
    }

    /// Expires `CREATED` intents older than the configured time to live and
    /// returns their ids.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale_intents(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregateId>, PaymentError> {
        let Some(cutoff) = TimeDelta::from_std(self.settings.intent_ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return Ok(vec![]);
        };

        let stale: Vec<AggregateId> = self
            .index()
            .open
            .iter()
            .filter(|(_, created_at)| **created_at <= cutoff)
            .map(|(intent_id, _)| *intent_id)
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for intent_id in stale {
            let _guard = self.intent_locks.lock(&intent_id).await;
            let Some(intent) = self.load(intent_id).await? else {
                continue;
            };
            if intent.status().is_terminal() {
                self.index_mut().track(&intent);
                continue;
            }

            self.execute(intent_id, |intent| intent.expire(now)).await?;
            metrics::counter!("payment_intents_expired_total").increment(1);
            tracing::info!(
                %intent_id,
                order_number = %intent.order_number(),
                "payment intent expired"
            );
            expired.push(intent_id);
        }
        Ok(expired)
    }

    pub async fn get_intent(
        &self,
        intent_id: AggregateId,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        self.load(intent_id).await
    }

    pub async fn find_by_reference(
        &self,
        provider_reference: &str,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        let intent_id = self.index().by_reference.get(provider_reference).copied();
        match intent_id {
            Some(intent_id) => self.load(intent_id).await,
            None => Ok(None),
        }
    }

    /// Every intent opened for the order, oldest first.
    pub async fn intents_for_order(
        &self,
        order_id: AggregateId,
    ) -> Result<Vec<PaymentIntent>, PaymentError> {
        let intent_ids = self
            .index()
            .by_order
            .get(&order_id)
            .cloned()
            .unwrap_or_default();

        let mut intents = Vec::with_capacity(intent_ids.len());
        for intent_id in intent_ids {
            if let Some(intent) = self.load(intent_id).await? {
                intents.push(intent);
            }
        }
        Ok(intents)
    }

    async fn open_intent_for(
        &self,
        order_id: AggregateId,
    ) -> Result<Option<(AggregateId, PaymentIntent)>, PaymentError> {
        let open_ids: Vec<AggregateId> = {
            let index = self.index();
            index
                .by_order
                .get(&order_id)
                .into_iter()
                .flatten()
                .filter(|intent_id| index.open.contains_key(intent_id))
                .copied()
                .collect()
        };

        for intent_id in open_ids {
            if let Some(intent) = self.load(intent_id).await?
                && intent.status() == IntentStatus::Created
            {
                return Ok(Some((intent_id, intent)));
            }
        }
        Ok(None)
    }

    async fn load(&self, intent_id: AggregateId) -> Result<Option<PaymentIntent>, PaymentError> {
        let events = self.store.get_events_for_aggregate(intent_id).await?;
        if events.is_empty() {
            return Ok(None);
        }

        let mut intent = PaymentIntent::default();
        for envelope in events {
            let event: IntentEvent = serde_json::from_value(envelope.payload)?;
            intent.apply(event);
            intent.set_version(envelope.version);
        }
        Ok(Some(intent))
    }

    /// Load → decide → append with an expected-version check, then refresh
    /// the index.
    async fn execute<F>(
        &self,
        intent_id: AggregateId,
        decide: F,
    ) -> Result<PaymentIntent, PaymentError>
    where
        F: FnOnce(&PaymentIntent) -> Result<Vec<IntentEvent>, PaymentError>,
    {
        let mut intent = self.load(intent_id).await?.unwrap_or_default();
        let current_version = intent.version();

        let events = decide(&intent)?;
        if !events.is_empty() {
            let mut envelopes = Vec::with_capacity(events.len());
            let mut version = current_version;
            for event in &events {
                version = version.next();
                envelopes.push(
                    EventEnvelope::builder()
                        .aggregate_id(intent_id)
                        .aggregate_type(PaymentIntent::aggregate_type())
                        .event_type(event.event_type())
                        .version(version)
                        .payload(event)?
                        .build()?,
                );
            }

            let options = if current_version == Version::initial() {
                AppendOptions::expect_new()
            } else {
                AppendOptions::expect_version(current_version)
            };
            let new_version = self.store.append(envelopes, options).await?;

            intent.apply_events(events);
            intent.set_version(new_version);
        }

        self.index_mut().track(&intent);
        Ok(intent)
    }

    fn index(&self) -> RwLockReadGuard<'_, IntentIndex> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn index_mut(&self) -> RwLockWriteGuard<'_, IntentIndex> {
        self.index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn receipt(
    intent_id: AggregateId,
    intent: &PaymentIntent,
    provider_reference: &str,
    replayed: bool,
) -> Result<CallbackReceipt, PaymentError> {
    Ok(CallbackReceipt {
        intent_id,
        order_id: intent
            .order_id()
            .ok_or(PaymentError::IntentNotFound(intent_id))?,
        provider_reference: provider_reference.to_string(),
        status: intent.status(),
        replayed,
    })
}
