//! Shared identifiers and concurrency helpers used across the workspace.

pub mod locks;
pub mod types;

pub use locks::KeyedLocks;
pub use types::AggregateId;
