//! Pipeline counters.
//!
//! Counts what the pipeline did in this session (samples taken in, samples
//! rejected, classifier calls, events committed and persisted) and can carry
//! the totals over between runs.

use crate::source::types::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Live counters, safe to bump from any lane.
#[derive(Debug)]
pub struct PipelineStats {
    primary_samples: AtomicU64,
    secondary_samples: AtomicU64,
    dropped_samples: AtomicU64,
    classifications: AtomicU64,
    respiratory_skips: AtomicU64,
    committed_events: AtomicU64,
    records_persisted: AtomicU64,
    persist_failures: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    /// Create an empty set of counters.
    pub fn new() -> Self {
        Self {
            primary_samples: AtomicU64::new(0),
            secondary_samples: AtomicU64::new(0),
            dropped_samples: AtomicU64::new(0),
            classifications: AtomicU64::new(0),
            respiratory_skips: AtomicU64::new(0),
            committed_events: AtomicU64::new(0),
            records_persisted: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Counters that start from the totals saved at `path`, if any.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            warn!(error = %e, "could not load previous pipeline stats");
        }

        stats
    }

    /// Record an admitted sample from `source`.
    pub fn record_sample(&self, source: SourceKind) {
        match source {
            SourceKind::Primary => self.primary_samples.fetch_add(1, Ordering::Relaxed),
            SourceKind::Secondary => self.secondary_samples.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Record a rejected sample.
    pub fn record_dropped_sample(&self) {
        self.dropped_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one classifier invocation.
    pub fn record_classification(&self) {
        self.classifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a respiratory decision taken without the classifier.
    pub fn record_respiratory_skip(&self) {
        self.respiratory_skips.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a debounce accept.
    pub fn record_committed_event(&self) {
        self.committed_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a record written to the store.
    pub fn record_persisted(&self) {
        self.records_persisted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a record the sink dropped.
    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            primary_samples: self.primary_samples.load(Ordering::Relaxed),
            secondary_samples: self.secondary_samples.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
            classifications: self.classifications.load(Ordering::Relaxed),
            respiratory_skips: self.respiratory_skips.load(Ordering::Relaxed),
            committed_events: self.committed_events.load(Ordering::Relaxed),
            records_persisted: self.records_persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Pipeline Statistics:\n\
             - Primary samples: {}\n\
             - Secondary samples: {}\n\
             - Dropped samples: {}\n\
             - Classifier calls: {}\n\
             - Respiratory checks skipped (high motion): {}\n\
             - State changes committed: {}\n\
             - Records persisted: {}\n\
             - Persistence failures: {}\n\
             - Session duration: {} seconds",
            stats.primary_samples,
            stats.secondary_samples,
            stats.dropped_samples,
            stats.classifications,
            stats.respiratory_skips,
            stats.committed_events,
            stats.records_persisted,
            stats.persist_failures,
            stats.session_duration_secs
        )
    }

    /// Save counters to the persistence path, if one is set.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                primary_samples: stats.primary_samples,
                secondary_samples: stats.secondary_samples,
                dropped_samples: stats.dropped_samples,
                classifications: stats.classifications,
                respiratory_skips: stats.respiratory_skips,
                committed_events: stats.committed_events,
                records_persisted: stats.records_persisted,
                persist_failures: stats.persist_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.primary_samples
                    .store(persisted.primary_samples, Ordering::Relaxed);
                self.secondary_samples
                    .store(persisted.secondary_samples, Ordering::Relaxed);
                self.dropped_samples
                    .store(persisted.dropped_samples, Ordering::Relaxed);
                self.classifications
                    .store(persisted.classifications, Ordering::Relaxed);
                self.respiratory_skips
                    .store(persisted.respiratory_skips, Ordering::Relaxed);
                self.committed_events
                    .store(persisted.committed_events, Ordering::Relaxed);
                self.records_persisted
                    .store(persisted.records_persisted, Ordering::Relaxed);
                self.persist_failures
                    .store(persisted.persist_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub primary_samples: u64,
    pub secondary_samples: u64,
    pub dropped_samples: u64,
    pub classifications: u64,
    pub respiratory_skips: u64,
    pub committed_events: u64,
    pub records_persisted: u64,
    pub persist_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    primary_samples: u64,
    secondary_samples: u64,
    dropped_samples: u64,
    classifications: u64,
    respiratory_skips: u64,
    committed_events: u64,
    records_persisted: u64,
    persist_failures: u64,
    last_updated: DateTime<Utc>,
}

pub type SharedStats = Arc<PipelineStats>;

/// Create a new shared set of counters.
pub fn create_shared_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}

/// Create shared counters that continue from, and save to, `path`.
pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(PipelineStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_counting() {
        let stats = PipelineStats::new();

        stats.record_sample(SourceKind::Primary);
        stats.record_sample(SourceKind::Primary);
        stats.record_sample(SourceKind::Secondary);
        stats.record_dropped_sample();

        let snapshot = stats.stats();
        assert_eq!(snapshot.primary_samples, 2);
        assert_eq!(snapshot.secondary_samples, 1);
        assert_eq!(snapshot.dropped_samples, 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join("wearable-activity-agent-test")
            .join(format!("stats-{}.json", Uuid::new_v4()));

        let stats = PipelineStats::with_persistence(path.clone());
        stats.record_classification();
        stats.record_committed_event();
        stats.save().unwrap();

        let reloaded = PipelineStats::with_persistence(path.clone());
        assert_eq!(reloaded.stats().classifications, 1);
        assert_eq!(reloaded.stats().committed_events, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_summary_format() {
        let summary = PipelineStats::new().summary();
        assert!(summary.contains("Primary samples"));
        assert!(summary.contains("Respiratory checks skipped"));
        assert!(summary.contains("Persistence failures"));
    }
}
