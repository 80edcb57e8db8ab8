//! API error types with HTTP response mapping.
//!
//! Every error renders as `{ "error", "code", "retry"?, "details"? }`.
//! `retry` tells clients whether repeating the same request may help.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CartError, CatalogError, DomainError, OrderError};
use event_store::EventStoreError;
use payments::PaymentError;
use projections::ProjectionError;
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed actor identity.
    Unauthorized(String),
    BadRequest { code: &'static str, message: String },
    Domain(DomainError),
    Payment(PaymentError),
    Projection(ProjectionError),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

struct Mapped {
    status: StatusCode,
    code: &'static str,
    retry: Option<bool>,
    details: Option<Value>,
}

impl Mapped {
    fn new(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            retry: None,
            details: None,
        }
    }

    fn retry(mut self, retry: bool) -> Self {
        self.retry = Some(retry);
        self
    }

    fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (mapped, message) = match &self {
            ApiError::Unauthorized(msg) => {
                (Mapped::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED"), msg.clone())
            }
            ApiError::BadRequest { code, message } => {
                (Mapped::new(StatusCode::BAD_REQUEST, *code), message.clone())
            }
            ApiError::Domain(err) => (map_domain(err), err.to_string()),
            ApiError::Payment(err) => (map_payment(err), err.to_string()),
            ApiError::Projection(err) => (
                Mapped::new(StatusCode::INTERNAL_SERVER_ERROR, "READ_MODEL_FAILURE"),
                err.to_string(),
            ),
        };

        if mapped.status.is_server_error() {
            tracing::error!(error = %message, code = mapped.code, "request failed");
        }

        let body = ErrorBody {
            error: message,
            code: mapped.code,
            retry: mapped.retry,
            details: mapped.details,
        };
        (mapped.status, axum::Json(body)).into_response()
    }
}

fn map_domain(err: &DomainError) -> Mapped {
    match err {
        DomainError::Order(err) => map_order(err),
        DomainError::Cart(err) => map_cart(err),
        DomainError::Catalog(err) => map_catalog(err),
        DomainError::EventStore(err) => map_event_store(err),
        DomainError::Serialization(_) => {
            Mapped::new(StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_FAILURE")
        }
    }
}

fn map_order(err: &OrderError) -> Mapped {
    use StatusCode as S;
    match err {
        OrderError::NotFound(_) => Mapped::new(S::NOT_FOUND, "ORDER_NOT_FOUND"),
        OrderError::AlreadyPlaced => Mapped::new(S::CONFLICT, "ORDER_ALREADY_PLACED"),
        OrderError::EmptyCart => Mapped::new(S::UNPROCESSABLE_ENTITY, "EMPTY_CART"),
        OrderError::MissingIdempotencyKey => {
            Mapped::new(S::BAD_REQUEST, "MISSING_IDEMPOTENCY_KEY")
        }
        OrderError::InvalidShippingAddress { field } => {
            Mapped::new(S::UNPROCESSABLE_ENTITY, "INVALID_SHIPPING_ADDRESS")
                .details(json!({ "field": field }))
        }
        OrderError::InvalidCurrency(_) => Mapped::new(S::BAD_REQUEST, "INVALID_CURRENCY"),
        OrderError::InvalidOrderNumber(_) => Mapped::new(S::BAD_REQUEST, "INVALID_ORDER_NUMBER"),
        OrderError::UnknownStatus(_) => Mapped::new(S::BAD_REQUEST, "UNKNOWN_STATUS"),
        OrderError::ProductUnavailable { product_id } => {
            Mapped::new(S::CONFLICT, "PRODUCT_UNAVAILABLE")
                .details(json!({ "product_id": product_id }))
        }
        OrderError::StockChanged {
            product_id,
            available,
            requested,
        } => Mapped::new(S::CONFLICT, "STOCK_CHANGED").details(json!({
            "product_id": product_id,
            "available": available,
            "requested": requested,
        })),
        OrderError::StockRollbackFailed {
            product_id,
            quantity,
            ..
        } => Mapped::new(S::INTERNAL_SERVER_ERROR, "STOCK_ROLLBACK_FAILED")
            .details(json!({ "product_id": product_id, "quantity": quantity })),
        OrderError::InvalidTransition { from, to } => Mapped::new(S::CONFLICT, "INVALID_TRANSITION")
            .details(json!({ "from": from, "to": to })),
        OrderError::NotAuthorized => Mapped::new(S::FORBIDDEN, "NOT_AUTHORIZED"),
        OrderError::AlreadyPaid => Mapped::new(S::CONFLICT, "ALREADY_PAID"),
        OrderError::NotPayable { status } => {
            Mapped::new(S::CONFLICT, "ORDER_NOT_PAYABLE").details(json!({ "status": status }))
        }
        OrderError::PaymentAmountMismatch { expected, actual } => {
            Mapped::new(S::UNPROCESSABLE_ENTITY, "AMOUNT_MISMATCH")
                .details(json!({ "expected": expected, "actual": actual }))
        }
    }
}

fn map_cart(err: &CartError) -> Mapped {
    use StatusCode as S;
    match err {
        CartError::InvalidQuantity { .. } => Mapped::new(S::BAD_REQUEST, "INVALID_QUANTITY"),
        CartError::ProductNotFound(_) => Mapped::new(S::NOT_FOUND, "PRODUCT_NOT_FOUND"),
        CartError::ProductUnavailable(product_id) => {
            Mapped::new(S::CONFLICT, "PRODUCT_UNAVAILABLE")
                .details(json!({ "product_id": product_id }))
        }
        CartError::OutOfStock(product_id) => {
            Mapped::new(S::CONFLICT, "OUT_OF_STOCK").details(json!({ "product_id": product_id }))
        }
        CartError::InsufficientStock {
            product_id,
            available,
            requested,
        } => Mapped::new(S::CONFLICT, "INSUFFICIENT_STOCK").details(json!({
            "product_id": product_id,
            "available": available,
            "requested": requested,
        })),
        CartError::ItemNotFound(_) => Mapped::new(S::NOT_FOUND, "CART_ITEM_NOT_FOUND"),
        CartError::Catalog(err) => map_catalog(err),
    }
}

fn map_catalog(err: &CatalogError) -> Mapped {
    match err {
        CatalogError::ProductNotFound(_) => Mapped::new(StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"),
        CatalogError::InsufficientStock {
            product_id,
            available,
            requested,
        } => Mapped::new(StatusCode::CONFLICT, "INSUFFICIENT_STOCK").details(json!({
            "product_id": product_id,
            "available": available,
            "requested": requested,
        })),
        CatalogError::Unavailable(_) => {
            Mapped::new(StatusCode::SERVICE_UNAVAILABLE, "CATALOG_UNAVAILABLE").retry(true)
        }
    }
}

fn map_event_store(err: &EventStoreError) -> Mapped {
    match err {
        EventStoreError::ConcurrencyConflict { .. } => {
            Mapped::new(StatusCode::CONFLICT, "CONCURRENCY_CONFLICT").retry(true)
        }
        _ => Mapped::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_FAILURE"),
    }
}

fn map_payment(err: &PaymentError) -> Mapped {
    use StatusCode as S;
    match err {
        PaymentError::OrderNotFound(_) => Mapped::new(S::NOT_FOUND, "ORDER_NOT_FOUND"),
        PaymentError::AlreadyPaid => Mapped::new(S::CONFLICT, "ALREADY_PAID"),
        PaymentError::OrderNotPayable { status } => {
            Mapped::new(S::CONFLICT, "ORDER_NOT_PAYABLE").details(json!({ "status": status }))
        }
        PaymentError::CurrencyMismatch { expected, actual } => {
            Mapped::new(S::UNPROCESSABLE_ENTITY, "CURRENCY_MISMATCH")
                .details(json!({ "expected": expected, "actual": actual }))
        }
        PaymentError::AmountMismatch { expected, actual } => {
            Mapped::new(S::UNPROCESSABLE_ENTITY, "AMOUNT_MISMATCH")
                .details(json!({ "expected": expected, "actual": actual }))
        }
        // Outcome unknown: the customer may have been charged.
        PaymentError::PaymentInFlight(intent_id) => Mapped::new(S::CONFLICT, "PAYMENT_IN_FLIGHT")
            .retry(false)
            .details(json!({ "intent_id": intent_id })),
        PaymentError::ProviderUnreachable(_) => {
            Mapped::new(S::SERVICE_UNAVAILABLE, "PROVIDER_UNREACHABLE").retry(false)
        }
        // Nothing was charged.
        PaymentError::ProviderRejected(_) => {
            Mapped::new(S::UNPROCESSABLE_ENTITY, "PROVIDER_REJECTED").retry(true)
        }
        PaymentError::UnknownProviderReference(_) => {
            Mapped::new(S::NOT_FOUND, "UNKNOWN_PROVIDER_REFERENCE")
        }
        PaymentError::MissingPayerReference => {
            Mapped::new(S::BAD_REQUEST, "MISSING_PAYER_REFERENCE")
        }
        PaymentError::IntentNotFound(_) => Mapped::new(S::NOT_FOUND, "INTENT_NOT_FOUND"),
        PaymentError::IntentAlreadyCreated => Mapped::new(S::CONFLICT, "INTENT_ALREADY_CREATED"),
        PaymentError::IntentClosed { status } => {
            Mapped::new(S::CONFLICT, "INTENT_CLOSED").details(json!({ "status": status }))
        }
        PaymentError::Domain(err) => map_domain(err),
        PaymentError::EventStore(err) => map_event_store(err),
        PaymentError::Serialization(_) => {
            Mapped::new(S::INTERNAL_SERVER_ERROR, "SERIALIZATION_FAILURE")
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}
