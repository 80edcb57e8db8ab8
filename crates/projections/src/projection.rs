//! The projection and read model contracts.

use async_trait::async_trait;
use event_store::RecordedEvent;
use serde::Serialize;

use crate::Result;

/// How far into the global event log a projection has read: the sequence
/// of the last event it handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ProjectionPosition {
    pub last_sequence: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Moves forward to `sequence`. Never moves back.
    pub fn advance_to(&self, sequence: u64) -> Self {
        Self {
            last_sequence: self.last_sequence.max(sequence),
        }
    }

    /// Whether the event at `sequence` is still unseen.
    pub fn is_behind(&self, sequence: u64) -> bool {
        self.last_sequence < sequence
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.last_sequence)
    }
}

/// Turns stored events into a query-friendly view.
///
/// Every event handed over must advance the position to its sequence,
/// including events of aggregates the projection ignores.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, recorded: &RecordedEvent) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    async fn reset(&self) -> Result<()>;
}

/// Size report for a read model, shown by the readiness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadModelStatus {
    pub name: &'static str,
    pub entries: usize,
}

pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Entries held. Reports 0 while a writer holds the view.
    fn count(&self) -> usize;

    fn status(&self) -> ReadModelStatus {
        ReadModelStatus {
            name: self.name(),
            entries: self.count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_tracks_unseen_events() {
        let position = ProjectionPosition::zero().advance_to(2).advance_to(5);
        assert_eq!(position.last_sequence, 5);
        assert!(!position.is_behind(5));
        assert!(position.is_behind(6));
        assert_eq!(position.to_string(), "position(5)");
    }

    #[test]
    fn position_never_moves_back() {
        let position = ProjectionPosition::zero().advance_to(7).advance_to(3);
        assert_eq!(position.last_sequence, 7);
    }

    struct Fixed;

    impl ReadModel for Fixed {
        fn name(&self) -> &'static str {
            "Fixed"
        }

        fn count(&self) -> usize {
            7
        }
    }

    #[test]
    fn status_reports_name_and_size() {
        assert_eq!(
            Fixed.status(),
            ReadModelStatus {
                name: "Fixed",
                entries: 7
            }
        );
    }
}
