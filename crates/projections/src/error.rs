use event_store::EventEnvelope;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A stored payload no longer matches the event shape the view expects.
    #[error("Unreadable {event_type} payload at {aggregate_id} v{version}: {source}")]
    Payload {
        event_type: String,
        aggregate_id: common::AggregateId,
        version: i64,
        #[source]
        source: serde_json::Error,
    },
}

impl ProjectionError {
    pub fn payload(event: &EventEnvelope, source: serde_json::Error) -> Self {
        Self::Payload {
            event_type: event.event_type.clone(),
            aggregate_id: event.aggregate_id,
            version: event.version.as_i64(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
