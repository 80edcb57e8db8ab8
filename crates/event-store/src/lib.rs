//! Append-only event log with optimistic concurrency.
//!
//! Orders and payment intents are persisted as streams of events keyed by
//! their aggregate id. Two backends implement [`EventStore`]: an in-memory
//! store for tests and development, and a PostgreSQL store.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, RecordedEvent, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{AppendOptions, EventStore, EventStream, RecordedEventStream};
