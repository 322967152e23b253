//! Event types produced by the cascade and consumed by the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which state a label describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Activity,
    RespiratoryState,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Activity => f.write_str("activity"),
            EventKind::RespiratoryState => f.write_str("respiratory_state"),
        }
    }
}

/// A label transition accepted by a debounce filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedEvent {
    pub kind: EventKind,
    pub label: String,
    pub timestamp: DateTime<Utc>,
}

/// One persisted line of the event store.
///
/// `committed` marks decisions the debounce filter accepted; the rest are
/// raw cascade decisions kept for history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: EventKind,
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub committed: bool,
}

impl EventRecord {
    /// Create a record with a fresh id.
    pub fn new(
        session_id: Uuid,
        kind: EventKind,
        label: impl Into<String>,
        timestamp: DateTime<Utc>,
        committed: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            kind,
            label: label.into(),
            timestamp,
            committed,
        }
    }
}
