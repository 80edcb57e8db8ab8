//! HTTP API for the pet-supplies marketplace.
//!
//! Customers manage carts, check out, pay and cancel; vendors work their
//! order queue; the payment provider reports back through a callback.
//! Requests are traced and counted in Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::Catalog;
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use payments::PaymentProvider;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// Creates the router with every route and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/cart",
            get(routes::cart::get::<S>).delete(routes::cart::clear::<S>),
        )
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route(
            "/cart/items/{item_id}",
            patch(routes::cart::update_item::<S>).delete(routes::cart::remove_item::<S>),
        )
        .route("/checkout", post(routes::checkout::checkout::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/number/{order_number}",
            get(routes::orders::get_by_number::<S>),
        )
        .route("/orders/{id}/cancel", patch(routes::orders::cancel::<S>))
        .route("/orders/{id}/status", patch(routes::vendor::advance::<S>))
        .route("/payments/intents", post(routes::payments::create_intent::<S>))
        .route("/payments/callback", post(routes::payments::callback::<S>))
        .route("/vendor/orders", get(routes::vendor::list::<S>))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::track_requests))
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over the given store, catalog and provider.
pub fn create_default_state<S: EventStore + Clone + 'static>(
    event_store: S,
    catalog: Arc<dyn Catalog>,
    provider: Arc<dyn PaymentProvider>,
    config: &Config,
) -> Arc<AppState<S>> {
    Arc::new(AppState::new(event_store, catalog, provider, config))
}
