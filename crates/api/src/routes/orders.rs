//! Customer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    Actor, Aggregate, CancelOrder, CustomerId, Order, OrderError, OrderLine, OrderNumber,
    OrderStatus, PaymentMethod, PaymentRecord, PaymentStatus, PriceBreakdown, ShippingAddress,
    ShippingOption, StatusChange,
};
use event_store::EventStore;
use projections::CustomerOrderSummary;
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::error::ApiError;
use crate::extract::Customer;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: Option<AggregateId>,
    pub order_number: OrderNumber,
    pub customer_id: Option<CustomerId>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub shipping_option: ShippingOption,
    pub payment_method: PaymentMethod,
    pub pricing: PriceBreakdown,
    pub currency: String,
    pub payment: Option<PaymentRecord>,
    pub status_history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id(),
            order_number: order.order_number().clone(),
            customer_id: order.customer_id(),
            status: order.status(),
            payment_status: order.payment_status(),
            lines: order.lines().to_vec(),
            shipping_address: order.shipping_address().clone(),
            shipping_option: order.shipping_option(),
            payment_method: order.payment_method(),
            pricing: *order.pricing(),
            currency: order.currency().to_string(),
            payment: order.payment().cloned(),
            status_history: order.status_history().to_vec(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

/// Orders are only visible to the customer who placed them.
fn owned_by(order: Order, customer_id: CustomerId) -> Result<Order, ApiError> {
    if order.is_owned_by(customer_id) {
        Ok(order)
    } else {
        Err(OrderError::NotAuthorized.into())
    }
}

async fn load_owned<S: EventStore + Clone + 'static>(
    state: &AppState<S>,
    order_id: AggregateId,
    customer_id: CustomerId,
) -> Result<Order, ApiError> {
    let order = state
        .ledger
        .get_order(order_id)
        .await?
        .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
    owned_by(order, customer_id)
}

/// GET /orders: the customer's order history from the read model.
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
) -> Result<Json<Vec<CustomerOrderSummary>>, ApiError> {
    state.projection_processor.run_catch_up().await?;
    Ok(Json(
        state.customer_orders.orders_for_customer(customer_id).await,
    ))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id(&id, "order id")?;
    let order = load_owned(&state, order_id, customer_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/number/{order_number}
#[tracing::instrument(skip(state))]
pub async fn get_by_number<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let number: OrderNumber = order_number.parse()?;
    let order = state
        .ledger
        .find_by_number(&number)
        .await?
        .ok_or(OrderError::NotFound(order_number))?;
    let order = owned_by(order, customer_id)?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PATCH /orders/{id}/cancel, with an optional `{ "reason" }` body.
#[tracing::instrument(skip(state, body))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id(&id, "order id")?;
    let request: CancelRequest = if body.is_empty() {
        CancelRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::bad_request("INVALID_BODY", err.to_string()))?
    };

    let mut cmd = CancelOrder::new(order_id, Actor::Customer(customer_id));
    if let Some(reason) = request.reason {
        cmd = cmd.with_reason(reason);
    }
    let order = state.ledger.cancel(cmd).await?;
    Ok(Json(OrderResponse::from(&order)))
}
