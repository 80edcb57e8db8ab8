//! Query side of the marketplace: order views rebuilt from the event log.
//!
//! - [`Projection`] folds events into a view and tracks its position
//! - [`ProjectionProcessor`] streams the store into every registered view
//! - [`CustomerOrdersView`] backs a customer's order history
//! - [`VendorOrdersView`] backs a vendor's order queue

pub mod error;
pub mod processor;
pub mod projection;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition, ReadModel, ReadModelStatus};
pub use views::{CustomerOrderSummary, CustomerOrdersView, VendorOrderSummary, VendorOrdersView};
