//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded against an aggregate, named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Event type name stored next to the payload and used for filtering.
    fn event_type(&self) -> &'static str;
}

/// An event-sourced entity.
///
/// Aggregates are rebuilt by replaying their events through [`apply`], which
/// must be deterministic and infallible. Commands are plain methods that
/// inspect the current state and return the events to record.
///
/// [`apply`]: Aggregate::apply
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;

    type Error: std::error::Error + Send + Sync;

    /// Aggregate kind written to every envelope, e.g. `Order`.
    fn aggregate_type() -> &'static str;

    /// `None` until the first event has been applied.
    fn id(&self) -> Option<AggregateId>;

    fn version(&self) -> Version;

    /// Called by the command handler after loading or appending events.
    fn set_version(&mut self, version: Version);

    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
