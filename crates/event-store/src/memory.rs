use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{AppendOptions, EventStore, EventStream, RecordedEventStream, validate_batch};
use crate::{AggregateId, EventEnvelope, EventStoreError, RecordedEvent, Result, Version};

#[derive(Debug, Default)]
struct Log {
    events: Vec<EventEnvelope>,
    versions: HashMap<AggregateId, Version>,
}

/// In-memory event store for tests and single-process development.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    fail_appends: Arc<AtomicBool>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Makes every subsequent append fail with [`EventStoreError::Unavailable`].
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_batch(&events)?;

        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable(
                "appends disabled".to_string(),
            ));
        }

        let aggregate_id = events[0].aggregate_id;
        let first_version = events[0].version;
        let mut log = self.log.write().await;

        let current = log
            .versions
            .get(&aggregate_id)
            .copied()
            .unwrap_or_else(Version::initial);

        if let Some(expected) = options.expected_version
            && current != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current,
            });
        }

        // Mirrors the unique (aggregate_id, version) constraint of the SQL schema.
        if first_version != current.next() {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(current),
                actual: current,
            });
        }

        let last_version = events
            .last()
            .map(|e| e.version)
            .unwrap_or(first_version);
        log.versions.insert(aggregate_id, last_version);
        log.events.extend(events);

        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.log.read().await.events.clone();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    /// The event at index `i` of the log carries sequence `i + 1`.
    async fn stream_events_after(&self, after: u64) -> Result<RecordedEventStream> {
        use futures_util::stream;

        let skip = usize::try_from(after).unwrap_or(usize::MAX);
        let recorded: Vec<Result<RecordedEvent>> = self
            .log
            .read()
            .await
            .events
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(index, event)| {
                Ok(RecordedEvent {
                    sequence: index as u64 + 1,
                    event: event.clone(),
                })
            })
            .collect();
        Ok(Box::pin(stream::iter(recorded)))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.log.read().await.versions.get(&aggregate_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    fn envelope(aggregate_id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Order")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"seq": version}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let version = store
            .append(
                vec![
                    envelope(id, 1, "OrderPlaced"),
                    envelope(id, 2, "FulfillmentAdvanced"),
                ],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        let events = store.get_events_for_aggregate(id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, "FulfillmentAdvanced");
        assert_eq!(
            store.get_aggregate_version(id).await.unwrap(),
            Some(Version::new(2))
        );
    }

    #[tokio::test]
    async fn stale_writer_gets_conflict() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![envelope(id, 1, "OrderPlaced")], AppendOptions::expect_new())
            .await
            .unwrap();

        // Both writers loaded version 1; the first wins.
        store
            .append(
                vec![envelope(id, 2, "FulfillmentAdvanced")],
                AppendOptions::expect_version(Version::first()),
            )
            .await
            .unwrap();
        let loser = store
            .append(
                vec![envelope(id, 2, "OrderCancelled")],
                AppendOptions::expect_version(Version::first()),
            )
            .await;

        assert!(matches!(
            loser,
            Err(EventStoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(2)
        ));
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn duplicate_version_without_expectation_is_rejected() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![envelope(id, 1, "OrderPlaced")], AppendOptions::new())
            .await
            .unwrap();

        let result = store
            .append(vec![envelope(id, 1, "OrderPlaced")], AppendOptions::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn filters_by_type_across_aggregates() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append(vec![envelope(a, 1, "OrderPlaced")], AppendOptions::expect_new())
            .await
            .unwrap();
        store
            .append(vec![envelope(b, 1, "OrderPlaced")], AppendOptions::expect_new())
            .await
            .unwrap();
        store
            .append(
                vec![envelope(a, 2, "OrderCancelled")],
                AppendOptions::expect_version(Version::first()),
            )
            .await
            .unwrap();

        let placed = store.get_events_by_type("OrderPlaced").await.unwrap();
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].aggregate_id, a);
        assert_eq!(placed[1].aggregate_id, b);
    }

    #[tokio::test]
    async fn stream_preserves_append_order() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append(vec![envelope(b, 1, "OrderPlaced")], AppendOptions::expect_new())
            .await
            .unwrap();
        store
            .append(vec![envelope(a, 1, "OrderPlaced")], AppendOptions::expect_new())
            .await
            .unwrap();

        let ids: Vec<AggregateId> = store
            .stream_all_events()
            .await
            .unwrap()
            .map(|e| e.unwrap().aggregate_id)
            .collect()
            .await;
        assert_eq!(ids, vec![b, a]);
    }

    #[tokio::test]
    async fn reads_only_events_after_a_sequence() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        store
            .append(
                vec![envelope(a, 1, "OrderPlaced"), envelope(a, 2, "PaymentRecorded")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
        store
            .append(
                vec![envelope(a, 3, "FulfillmentAdvanced")],
                AppendOptions::expect_version(Version::new(2)),
            )
            .await
            .unwrap();

        let tail: Vec<(u64, String)> = store
            .stream_events_after(1)
            .await
            .unwrap()
            .map(|r| {
                let r = r.unwrap();
                (r.sequence, r.event.event_type)
            })
            .collect()
            .await;
        assert_eq!(
            tail,
            vec![
                (2, "PaymentRecorded".to_string()),
                (3, "FulfillmentAdvanced".to_string())
            ]
        );

        let nothing: Vec<_> = store
            .stream_events_after(3)
            .await
            .unwrap()
            .collect()
            .await;
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn failure_switch_blocks_appends() {
        let store = InMemoryEventStore::new();
        store.set_fail_appends(true);

        let result = store
            .append(
                vec![envelope(AggregateId::new(), 1, "OrderPlaced")],
                AppendOptions::expect_new(),
            )
            .await;

        assert!(matches!(result, Err(EventStoreError::Unavailable(_))));
        assert_eq!(store.event_count().await, 0);
    }
}
