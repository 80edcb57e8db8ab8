//! Vendor endpoints: order queue and fulfillment updates.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use domain::OrderStatus;
use event_store::EventStore;
use projections::VendorOrderSummary;
use serde::Deserialize;

use super::orders::OrderResponse;
use super::parse_id;
use crate::error::ApiError;
use crate::extract::Vendor;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VendorOrdersQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    /// Accepts `PROCESSING` for `PACKED`.
    pub status: String,
}

/// GET /vendor/orders?status=
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Vendor(vendor_id): Vendor,
    Query(query): Query<VendorOrdersQuery>,
) -> Result<Json<Vec<VendorOrderSummary>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()?;

    state.projection_processor.run_catch_up().await?;
    Ok(Json(
        state.vendor_orders.orders_for_vendor(vendor_id, status).await,
    ))
}

/// PATCH /orders/{id}/status
#[tracing::instrument(skip(state))]
pub async fn advance<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Vendor(vendor_id): Vendor,
    Path(id): Path<String>,
    Json(req): Json<AdvanceRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id(&id, "order id")?;
    let target: OrderStatus = req.status.parse()?;
    let order = state.vendors.advance(vendor_id, order_id, target).await?;
    Ok(Json(OrderResponse::from(&order)))
}
