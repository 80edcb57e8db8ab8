//! POST /checkout

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use domain::{CheckoutRequest, OrderError, PaymentMethod, ShippingAddress, ShippingOption};
use event_store::EventStore;
use serde::Deserialize;

use super::orders::OrderResponse;
use crate::error::ApiError;
use crate::extract::{Customer, IDEMPOTENCY_HEADER};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub shipping_option: ShippingOption,
}

/// Places an order from the caller's cart.
///
/// Responds 201 for a new order and 200 when the idempotency key already
/// produced one.
#[tracing::instrument(skip(state, headers, body))]
pub async fn checkout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
    headers: HeaderMap,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(OrderError::MissingIdempotencyKey)?;

    let placement = state
        .checkout
        .checkout(
            customer_id,
            CheckoutRequest {
                idempotency_key: idempotency_key.to_string(),
                shipping_address: body.shipping_address,
                payment_method: body.payment_method,
                shipping_option: body.shipping_option,
            },
        )
        .await?;

    let status = if placement.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(OrderResponse::from(&placement.order))))
}
