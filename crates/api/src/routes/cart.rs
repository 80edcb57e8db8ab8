//! Cart endpoints. The cart belongs to the customer named in the request.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{
    Cart, CartError, CartItemId, CustomerId, Money, PriceBreakdown, ProductId, ShippingOption,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::error::ApiError;
use crate::extract::Customer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct PreviewQuery {
    #[serde(default)]
    pub shipping_option: Option<ShippingOption>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// The cart with a price preview at its frozen unit prices.
#[derive(Serialize)]
pub struct CartResponse {
    pub customer_id: CustomerId,
    pub items: Vec<CartItemResponse>,
    pub shipping_option: ShippingOption,
    pub pricing: PriceBreakdown,
    pub currency: String,
    pub last_modified_at: Option<DateTime<Utc>>,
}

fn respond<S: EventStore>(
    state: &AppState<S>,
    cart: Cart,
    shipping_option: ShippingOption,
) -> Json<CartResponse> {
    let pricing = state
        .ledger
        .pricing()
        .price_cart(&cart.snapshot(), shipping_option);
    Json(CartResponse {
        customer_id: cart.customer_id,
        items: cart
            .items
            .iter()
            .map(|item| CartItemResponse {
                item_id: item.item_id,
                product_id: item.product_id.clone(),
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total(),
            })
            .collect(),
        shipping_option,
        pricing,
        currency: state.ledger.currency().to_string(),
        last_modified_at: cart.last_modified_at,
    })
}

/// Quantities arrive signed so that zero and negatives get a domain error.
fn quantity(raw: i64) -> Result<u32, CartError> {
    u32::try_from(raw)
        .ok()
        .filter(|quantity| *quantity >= 1)
        .ok_or(CartError::InvalidQuantity { quantity: raw })
}

/// GET /cart
#[tracing::instrument(skip(state, query))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
    Query(query): Query<PreviewQuery>,
) -> Json<CartResponse> {
    let cart = state.carts.get(customer_id).await;
    respond(&state, cart, query.shipping_option.unwrap_or_default())
}

/// POST /cart/items
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn add_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let quantity = quantity(req.quantity)?;
    let cart = state
        .carts
        .add_item(customer_id, ProductId::new(req.product_id), quantity)
        .await?;
    Ok((
        StatusCode::CREATED,
        respond(&state, cart, ShippingOption::default()),
    ))
}

/// PATCH /cart/items/{item_id}
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
    Path(item_id): Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let quantity = quantity(req.quantity)?;
    let item_id: CartItemId = parse_id(&item_id, "cart item id")?;
    let cart = state
        .carts
        .update_quantity(customer_id, item_id, quantity)
        .await?;
    Ok(respond(&state, cart, ShippingOption::default()))
}

/// DELETE /cart/items/{item_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
    Path(item_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let item_id: CartItemId = parse_id(&item_id, "cart item id")?;
    let cart = state.carts.remove_item(customer_id, item_id).await;
    Ok(respond(&state, cart, ShippingOption::default()))
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Customer(customer_id): Customer,
) -> Json<CartResponse> {
    let cart = state.carts.clear(customer_id).await;
    respond(&state, cart, ShippingOption::default())
}
