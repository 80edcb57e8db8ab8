//! Payment intent and provider callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, Currency, Money, OrderError, OrderNumber};
use event_store::EventStore;
use payments::{
    CallbackReceipt, CreatePaymentIntent, IntentStatus, PaymentIntent, ProviderCallback,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::Customer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: AggregateId,
    pub amount: Money,
    pub currency: Currency,
}

#[derive(Serialize)]
pub struct IntentResponse {
    pub intent_id: Option<AggregateId>,
    pub order_id: Option<AggregateId>,
    pub order_number: OrderNumber,
    pub status: IntentStatus,
    pub amount: Money,
    pub currency: String,
    pub provider_reference: Option<String>,
    pub approval_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&PaymentIntent> for IntentResponse {
    fn from(intent: &PaymentIntent) -> Self {
        Self {
            intent_id: intent.id(),
            order_id: intent.order_id(),
            order_number: intent.order_number().clone(),
            status: intent.status(),
            amount: intent.amount(),
            currency: intent.currency().to_string(),
            provider_reference: intent.provider_reference().map(str::to_string),
            approval_url: intent.approval_url().map(str::to_string),
            created_at: intent.created_at(),
        }
    }
}

/// POST /payments/intents
///
/// Only the order's owner may pay for it. An already open intent for the
/// order is returned as is.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn create_intent<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
    Json(req): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<IntentResponse>), ApiError> {
    let order = state
        .ledger
        .get_order(req.order_id)
        .await?
        .ok_or_else(|| OrderError::NotFound(req.order_id.to_string()))?;
    if !order.is_owned_by(customer_id) {
        return Err(OrderError::NotAuthorized.into());
    }

    let intent = state
        .payments
        .create_payment_intent(CreatePaymentIntent {
            order_id: req.order_id,
            amount: req.amount,
            currency: req.currency,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(IntentResponse::from(&intent))))
}

/// POST /payments/callback
///
/// Called by the provider. Repeated callbacks for a resolved intent are
/// acknowledged with `replayed: true`.
#[tracing::instrument(skip(state, callback), fields(provider_reference = %callback.provider_reference))]
pub async fn callback<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(callback): Json<ProviderCallback>,
) -> Result<Json<CallbackReceipt>, ApiError> {
    let receipt = state.payments.handle_provider_callback(callback).await?;
    Ok(Json(receipt))
}
