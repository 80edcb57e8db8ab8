//! Domain layer of the pet-supplies marketplace.
//!
//! - [`catalog`]: product lookup and stock counters
//! - [`cart`]: per-customer carts with stock-bounded quantities
//! - [`pricing`]: fixed-point subtotal, shipping, tax and total
//! - [`order`]: the event-sourced order aggregate and its ledger
//! - [`checkout`] and [`vendor`]: the customer and vendor entry points

pub mod aggregate;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod command;
pub mod error;
pub mod order;
pub mod pricing;
pub mod vendor;

pub use aggregate::{Aggregate, DomainEvent};
pub use cart::{Cart, CartError, CartItem, CartItemId, CartSnapshot, CartStore};
pub use catalog::{Catalog, CatalogError, InMemoryCatalog, Product};
pub use checkout::{Checkout, CheckoutRequest};
pub use command::{Command, CommandHandler, CommandResult};
pub use error::DomainError;
pub use order::{
    Actor, AdvanceFulfillment, CancelOrder, CreateOrder, Currency, CustomerId,
    FulfillmentAdvancedData, Money, Order, OrderCancelledData, OrderError, OrderEvent,
    OrderLedger, OrderLine, OrderNumber, OrderPlacedData, OrderStatus, PaymentMethod,
    PaymentRecord, PaymentRecordedData, PaymentStatus, Placement, ProductId, RecordPayment, ShippingAddress,
    StatusChange, VendorId,
};
pub use pricing::{PriceBreakdown, PricingPolicy, ShippingOption};
pub use vendor::VendorGateway;
