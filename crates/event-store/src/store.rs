use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, RecordedEvent, Result, Version};

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the stream must be at for the append to succeed.
    /// `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// No version check.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// The stream must not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// A stream of events in global append order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// A stream of events tagged with their global sequence, in sequence order.
pub type RecordedEventStream = Pin<Box<dyn Stream<Item = Result<RecordedEvent>> + Send>>;

/// Durable, append-only event log.
///
/// Appends are atomic per batch. When `expected_version` is set and the
/// stream has moved on, the append fails with
/// [`EventStoreError::ConcurrencyConflict`] and nothing is written.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch for a single aggregate and returns the new stream version.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// All events of one aggregate, oldest first.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Every event of the given type, in append order.
    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;

    /// Every event in the store, in append order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Events with a global sequence above `after`, in sequence order.
    ///
    /// A reader that remembers the last sequence it saw never misses an
    /// event committed later.
    async fn stream_events_after(&self, after: u64) -> Result<RecordedEventStream>;

    /// Current version of a stream, `None` if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Checks that a batch targets one aggregate with consecutive versions.
pub(crate) fn validate_batch(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected = first.version;
    for event in &events[1..] {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidAppend(
                "a batch must target a single aggregate".to_string(),
            ));
        }
        expected = expected.next();
        if event.version != expected {
            return Err(EventStoreError::InvalidAppend(format!(
                "versions must be consecutive: expected {expected}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Order")
            .event_type("OrderPlaced")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(
            validate_batch(&[]),
            Err(EventStoreError::InvalidAppend(_))
        ));
    }

    #[test]
    fn gaps_are_rejected() {
        let id = AggregateId::new();
        let batch = vec![envelope(id, 1), envelope(id, 3)];
        assert!(validate_batch(&batch).is_err());
    }

    #[test]
    fn mixed_aggregates_are_rejected() {
        let batch = vec![
            envelope(AggregateId::new(), 1),
            envelope(AggregateId::new(), 2),
        ];
        assert!(validate_batch(&batch).is_err());
    }

    #[test]
    fn consecutive_batch_is_accepted() {
        let id = AggregateId::new();
        let batch = vec![envelope(id, 4), envelope(id, 5), envelope(id, 6)];
        assert!(validate_batch(&batch).is_ok());
    }
}
