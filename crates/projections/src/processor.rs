//! Feeds stored events to projections.

use event_store::{EventStore, RecordedEvent};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Delivers events from an event store to registered projections.
///
/// - catch-up: reads the log after the lowest projection position and hands
///   each projection the events it has not seen yet
/// - rebuild: resets every projection and replays from scratch
///
/// Catch-up runs are serialized, so two requests refreshing the read models
/// at once never deliver the same event twice.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    catch_up: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            catch_up: Mutex::new(()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<()> {
        let _running = self.catch_up.lock().await;
        if self.projections.is_empty() {
            return Ok(());
        }

        let mut from = u64::MAX;
        for projection in &self.projections {
            from = from.min(projection.position().await.last_sequence);
        }

        let mut stream = self.store.stream_events_after(from).await?;
        let mut read: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(result) = stream.next().await {
            let recorded = result?;
            read += 1;

            for projection in &self.projections {
                if projection.position().await.is_behind(recorded.sequence) {
                    projection.handle(&recorded).await?;
                    delivered += 1;
                }
            }
        }

        if delivered > 0 {
            metrics::counter!("projections_events_processed").increment(delivered);
        }
        tracing::debug!(from, events = read, delivered, "catch-up complete");

        Ok(())
    }

    /// Hands one event to every projection, bypassing position tracking.
    #[tracing::instrument(skip(self, recorded), fields(event_type = %recorded.event.event_type))]
    pub async fn process_event(&self, recorded: &RecordedEvent) -> Result<()> {
        for projection in &self.projections {
            projection.handle(recorded).await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<()> {
        for projection in &self.projections {
            tracing::info!(projection = projection.name(), "resetting projection");
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{
        AppendOptions, EventEnvelope, EventStream, InMemoryEventStore, RecordedEventStream, Version,
    };
    use tokio::sync::RwLock;

    use super::*;
    use crate::projection::ProjectionPosition;

    #[derive(Default)]
    struct CountingProjection {
        count: Arc<RwLock<u64>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, recorded: &RecordedEvent) -> Result<()> {
            *self.count.write().await += 1;
            let mut position = self.position.write().await;
            *position = position.advance_to(recorded.sequence);
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    fn event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Order")
            .event_type("TestEvent")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({ "test": true }))
            .build()
            .unwrap()
    }

    /// Records the `after` argument of every tail read.
    #[derive(Clone)]
    struct RecordingStore {
        inner: InMemoryEventStore,
        reads: Arc<tokio::sync::Mutex<Vec<u64>>>,
    }

    impl RecordingStore {
        fn new(inner: InMemoryEventStore) -> Self {
            Self {
                inner,
                reads: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl EventStore for RecordingStore {
        async fn append(
            &self,
            events: Vec<EventEnvelope>,
            options: AppendOptions,
        ) -> event_store::Result<Version> {
            self.inner.append(events, options).await
        }

        async fn get_events_for_aggregate(
            &self,
            aggregate_id: AggregateId,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner.get_events_for_aggregate(aggregate_id).await
        }

        async fn get_events_by_type(
            &self,
            event_type: &str,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner.get_events_by_type(event_type).await
        }

        async fn stream_all_events(&self) -> event_store::Result<EventStream> {
            self.inner.stream_all_events().await
        }

        async fn stream_events_after(
            &self,
            after: u64,
        ) -> event_store::Result<RecordedEventStream> {
            self.reads.lock().await.push(after);
            self.inner.stream_events_after(after).await
        }

        async fn get_aggregate_version(
            &self,
            aggregate_id: AggregateId,
        ) -> event_store::Result<Option<Version>> {
            self.inner.get_aggregate_version(aggregate_id).await
        }
    }

    async fn store_with(events: i64) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        if events > 0 {
            let id = AggregateId::new();
            store
                .append(
                    (1..=events).map(|v| event(id, v)).collect(),
                    AppendOptions::new(),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn catch_up_delivers_every_event_once() {
        let projection = CountingProjection::default();
        let count = projection.count.clone();
        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        processor.run_catch_up().await.unwrap();

        assert_eq!(*count.read().await, 3);
    }

    #[tokio::test]
    async fn catch_up_reads_only_the_unseen_tail() {
        let store = RecordingStore::new(store_with(3).await);
        let projection = CountingProjection::default();
        let (count, position) = (projection.count.clone(), projection.position.clone());
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        let id = AggregateId::new();
        store
            .inner
            .append(vec![event(id, 1), event(id, 2)], AppendOptions::expect_new())
            .await
            .unwrap();
        processor.run_catch_up().await.unwrap();

        assert_eq!(*store.reads.lock().await, vec![0, 3]);
        assert_eq!(*count.read().await, 5);
        assert_eq!(position.read().await.last_sequence, 5);
    }

    #[tokio::test]
    async fn lagging_projection_sets_the_start() {
        let store = RecordingStore::new(store_with(4).await);
        let ahead = CountingProjection::default();
        *ahead.position.write().await = ProjectionPosition::zero().advance_to(4);
        let behind = CountingProjection::default();
        *behind.position.write().await = ProjectionPosition::zero().advance_to(2);
        let (ahead_count, behind_count) = (ahead.count.clone(), behind.count.clone());

        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(ahead));
        processor.register(Box::new(behind));
        processor.run_catch_up().await.unwrap();

        assert_eq!(*store.reads.lock().await, vec![2]);
        assert_eq!(*ahead_count.read().await, 0);
        assert_eq!(*behind_count.read().await, 2);
    }

    #[tokio::test]
    async fn concurrent_catch_ups_do_not_double_deliver() {
        let projection = CountingProjection::default();
        let count = projection.count.clone();
        let mut processor = ProjectionProcessor::new(store_with(5).await);
        processor.register(Box::new(projection));

        let (a, b) = tokio::join!(processor.run_catch_up(), processor.run_catch_up());
        a.unwrap();
        b.unwrap();

        assert_eq!(*count.read().await, 5);
    }

    #[tokio::test]
    async fn rebuild_resets_and_replays() {
        let projection = CountingProjection::default();
        let count = projection.count.clone();
        let position = projection.position.clone();
        let mut processor = ProjectionProcessor::new(store_with(2).await);
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();

        assert_eq!(*count.read().await, 2);
        assert_eq!(position.read().await.last_sequence, 2);
    }

    #[tokio::test]
    async fn process_event_reaches_every_projection() {
        let first = CountingProjection::default();
        let second = CountingProjection::default();
        let (c1, c2) = (first.count.clone(), second.count.clone());
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(first));
        processor.register(Box::new(second));
        assert_eq!(processor.projection_count(), 2);

        processor
            .process_event(&RecordedEvent {
                sequence: 1,
                event: event(AggregateId::new(), 1),
            })
            .await
            .unwrap();

        assert_eq!(*c1.read().await, 1);
        assert_eq!(*c2.read().await, 1);
    }

    #[tokio::test]
    async fn empty_store() {
        let projection = CountingProjection::default();
        let count = projection.count.clone();
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        assert_eq!(*count.read().await, 0);
    }
}
