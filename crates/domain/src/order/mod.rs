//! Orders: value objects, the order aggregate and the ledger that owns it.

mod aggregate;
mod commands;
mod events;
mod ledger;
mod state;
mod value_objects;

pub use aggregate::{Order, PaymentRecord, StatusChange};
pub use commands::{AdvanceFulfillment, CancelOrder, CreateOrder, RecordPayment};
pub use events::{
    FulfillmentAdvancedData, OrderCancelledData, OrderEvent, OrderPlacedData,
    PaymentRecordedData,
};
pub use ledger::{OrderLedger, Placement};
pub use state::{OrderStatus, PaymentStatus};
pub(crate) use value_objects::uuid_id;
pub use value_objects::{
    Actor, Currency, CustomerId, Money, OrderLine, OrderNumber, PaymentMethod, ProductId,
    ShippingAddress, VendorId,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Idempotency key is required")]
    MissingIdempotencyKey,

    #[error("Shipping address field `{field}` is required")]
    InvalidShippingAddress { field: &'static str },

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    #[error("Product is no longer available: {product_id}")]
    ProductUnavailable { product_id: ProductId },

    #[error("Stock changed for {product_id}: {available} available, {requested} requested")]
    StockChanged {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// Stock taken for an order could not be returned to the catalog.
    #[error("Failed to return {quantity} units of {product_id} to stock: {reason}")]
    StockRollbackFailed {
        product_id: ProductId,
        quantity: u32,
        reason: String,
    },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Not authorized to act on this order")]
    NotAuthorized,

    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Order cannot be paid in status {status}")]
    NotPayable { status: OrderStatus },

    #[error("Payment amount {actual} does not match order total {expected}")]
    PaymentAmountMismatch { expected: Money, actual: Money },
}
