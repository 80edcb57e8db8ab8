//! Read model views for the query side.

pub mod customer_orders;
pub mod vendor_orders;

pub use customer_orders::{CustomerOrderSummary, CustomerOrdersView};
pub use vendor_orders::{VendorOrderSummary, VendorOrdersView};
