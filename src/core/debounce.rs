//! Temporal debouncing of cascade labels.
//!
//! A candidate is committed only when it differs from the last committed
//! label and at least `min_dwell` has passed since that commit. The check runs
//! on every candidate, so a flapping classifier stays suppressed until the
//! dwell boundary and a steady one never re-triggers.

use crate::core::events::{CommittedEvent, EventKind};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Debounce state for one event kind.
#[derive(Debug, Clone)]
pub struct DebounceFilter {
    kind: EventKind,
    min_dwell_ms: u64,
    last_label: Option<String>,
    last_commit_ms: Option<u64>,
}

impl DebounceFilter {
    /// Filter for `kind` with nothing committed yet.
    pub fn new(kind: EventKind, min_dwell: Duration) -> Self {
        Self {
            kind,
            min_dwell_ms: min_dwell.as_millis() as u64,
            last_label: None,
            last_commit_ms: None,
        }
    }

    /// Most recently committed label.
    pub fn last_label(&self) -> Option<&str> {
        self.last_label.as_deref()
    }

    /// Offer a candidate observed at `now_ms` (monotonic) / `at` (wall clock).
    pub fn offer(
        &mut self,
        candidate: &str,
        now_ms: u64,
        at: DateTime<Utc>,
    ) -> Option<CommittedEvent> {
        if self.last_label.as_deref() == Some(candidate) {
            return None;
        }

        if let Some(last) = self.last_commit_ms {
            if now_ms.saturating_sub(last) < self.min_dwell_ms {
                return None;
            }
        }

        self.last_label = Some(candidate.to_string());
        self.last_commit_ms = Some(now_ms);

        Some(CommittedEvent {
            kind: self.kind,
            label: candidate.to_string(),
            timestamp: at,
        })
    }
}
