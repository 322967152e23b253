//! Cascade router for the two ingestion lanes.
//!
//! The primary lane runs, per sample that fills its activity window:
//!
//! ```text
//!            ┌──────────┐  Dynamic  ┌──────────────┐
//! window ───▶│  branch  │──────────▶│   dynamic    │──────────────┐
//!  (50)      └──────────┘           └──────────────┘              │
//!                 │ Static          ┌──────────────┐              ▼
//!                 └────────────────▶│    static    │──▶ Sitting/Standing? ──▶ activity
//!                                   └──────────────┘    (secondary live:
//!                                                        use aux label)
//! ```
//!
//! and, per sample that fills its respiratory window, either short-circuits to
//! `Normal` for high-motion activities or runs the respiratory classifier.
//!
//! The secondary lane only keeps the latest sitting/standing label warm for
//! the disambiguation step. It never emits events of its own.

use crate::core::classifier::{ClassifierError, ClassifierPort};
use crate::core::events::{CommittedEvent, EventKind};
use crate::core::freshness::FreshnessGate;
use crate::core::labels;
use crate::core::pipeline::{wall_clock_at, PipelineError, PipelineShared};
use crate::core::windowing::{SlidingWindow, WindowPurpose, WindowSnapshot};
use crate::source::types::{Sample, SampleError, SourceKind};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The five classifiers the cascade needs, validated against each other.
#[derive(Debug)]
pub struct CascadeModels {
    pub(crate) branch: ClassifierPort,
    pub(crate) static_activity: ClassifierPort,
    pub(crate) dynamic_activity: ClassifierPort,
    pub(crate) secondary_aux: ClassifierPort,
    pub(crate) respiratory: ClassifierPort,
}

impl CascadeModels {
    /// Check window lengths and label tables across the five stages.
    pub fn new(
        branch: ClassifierPort,
        static_activity: ClassifierPort,
        dynamic_activity: ClassifierPort,
        secondary_aux: ClassifierPort,
        respiratory: ClassifierPort,
    ) -> Result<Self, PipelineError> {
        let branch_labels = &branch.spec().class_labels;
        if branch_labels.len() != 2
            || !branch.spec().has_label(labels::DYNAMIC)
            || !branch.spec().has_label(labels::STATIC)
        {
            return Err(PipelineError::Config(format!(
                "branch classifier must output exactly [{}, {}], got {:?}",
                labels::DYNAMIC,
                labels::STATIC,
                branch_labels
            )));
        }

        if !static_activity.spec().has_label(labels::SITTING_STANDING) {
            return Err(PipelineError::Config(format!(
                "static classifier has no '{}' class",
                labels::SITTING_STANDING
            )));
        }

        if secondary_aux.spec().num_classes != 2 {
            return Err(PipelineError::Config(format!(
                "secondary classifier must be binary, got {} classes",
                secondary_aux.spec().num_classes
            )));
        }

        let activity_len = branch.spec().input_length;
        for port in [&static_activity, &dynamic_activity] {
            if port.spec().input_length != activity_len {
                return Err(PipelineError::Config(format!(
                    "{} classifier expects {} samples but the activity window holds {}",
                    port.name(),
                    port.spec().input_length,
                    activity_len
                )));
            }
        }

        Ok(Self {
            branch,
            static_activity,
            dynamic_activity,
            secondary_aux,
            respiratory,
        })
    }

    /// Samples per activity window, shared by the branch and both specialists.
    pub fn activity_window_len(&self) -> usize {
        self.branch.spec().input_length
    }

    /// Samples per respiratory window.
    pub fn respiratory_window_len(&self) -> usize {
        self.respiratory.spec().input_length
    }

    /// Samples per secondary-source window.
    pub fn secondary_window_len(&self) -> usize {
        self.secondary_aux.spec().input_length
    }
}

/// Cross-lane cascade state. Lives inside the pipeline's shared lock.
#[derive(Debug, Clone)]
pub struct CascadeState {
    pub last_primary_activity_label: Option<String>,
    pub last_secondary_aux_label: Option<String>,
    /// Holds the secondary source's last-seen time.
    pub secondary_freshness: FreshnessGate,
}

impl CascadeState {
    /// State before any sample has been seen.
    pub fn new(secondary_freshness: FreshnessGate) -> Self {
        Self {
            last_primary_activity_label: None,
            last_secondary_aux_label: None,
            secondary_freshness,
        }
    }

    /// Replace the combined sitting/standing class with the secondary
    /// source's label when that source is live.
    pub fn disambiguate(&self, specialized: &str, now_ms: u64) -> String {
        if specialized != labels::SITTING_STANDING {
            return specialized.to_string();
        }
        match &self.last_secondary_aux_label {
            Some(aux) if self.secondary_freshness.is_live(now_ms) => aux.clone(),
            _ => specialized.to_string(),
        }
    }
}

/// What one sample did to the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    /// Set when the sample was rejected; nothing else happened.
    pub dropped: Option<SampleError>,
    /// Activity decision made on this sample, after disambiguation.
    pub activity: Option<String>,
    /// Respiratory decision made on this sample.
    pub respiratory: Option<String>,
    /// True when the respiratory decision came from the high-motion shortcut.
    pub respiratory_skipped: bool,
    /// Secondary-lane label cached on this sample.
    pub secondary_aux: Option<String>,
    /// Debounce accepts produced by this sample.
    pub committed: Vec<CommittedEvent>,
}

impl StepOutcome {
    fn dropped(error: SampleError) -> Self {
        Self {
            dropped: Some(error),
            ..Self::default()
        }
    }
}

/// Per-lane sample admission: source tag, value range, arrival order and
/// clock range.
#[derive(Debug)]
struct Admission {
    source: SourceKind,
    max_abs: f32,
    epoch: DateTime<Utc>,
    last_arrival_ms: Option<u64>,
}

impl Admission {
    fn new(source: SourceKind, max_abs: f32, epoch: DateTime<Utc>) -> Self {
        Self {
            source,
            max_abs,
            epoch,
            last_arrival_ms: None,
        }
    }

    /// Accept a sample and return its wall-clock time.
    fn check(&mut self, sample: &Sample) -> Result<DateTime<Utc>, SampleError> {
        if sample.source != self.source {
            return Err(SampleError::WrongSource {
                expected: self.source,
                actual: sample.source,
            });
        }
        sample.validate(self.max_abs)?;
        let Some(at) = wall_clock_at(self.epoch, sample.arrival_ms) else {
            return Err(SampleError::ClockOverflow {
                arrival_ms: sample.arrival_ms,
            });
        };
        if let Some(previous_ms) = self.last_arrival_ms {
            if sample.arrival_ms < previous_ms {
                return Err(SampleError::OutOfOrder {
                    previous_ms,
                    arrival_ms: sample.arrival_ms,
                });
            }
        }
        self.last_arrival_ms = Some(sample.arrival_ms);
        Ok(at)
    }
}

/// Primary-source lane: activity cascade plus respiratory gating.
///
/// Owns its windows and classifiers; only the shared state crosses lanes.
pub struct PrimaryLane {
    admission: Admission,
    activity_window: SlidingWindow,
    respiratory_window: SlidingWindow,
    branch: ClassifierPort,
    static_activity: ClassifierPort,
    dynamic_activity: ClassifierPort,
    respiratory: ClassifierPort,
    shared: Arc<PipelineShared>,
}

impl PrimaryLane {
    pub(crate) fn new(
        branch: ClassifierPort,
        static_activity: ClassifierPort,
        dynamic_activity: ClassifierPort,
        respiratory: ClassifierPort,
        max_abs: f32,
        shared: Arc<PipelineShared>,
    ) -> Self {
        let activity_len = branch.spec().input_length;
        let respiratory_len = respiratory.spec().input_length;
        Self {
            admission: Admission::new(SourceKind::Primary, max_abs, shared.epoch()),
            activity_window: SlidingWindow::new(WindowPurpose::Activity, activity_len),
            respiratory_window: SlidingWindow::new(WindowPurpose::Respiratory, respiratory_len),
            branch,
            static_activity,
            dynamic_activity,
            respiratory,
            shared,
        }
    }

    /// Feed one primary sample through the cascade.
    ///
    /// Rejected samples are logged and reported in the outcome; only a
    /// classifier failure returns an error.
    pub fn push(&mut self, sample: Sample) -> Result<StepOutcome, PipelineError> {
        let at = match self.admission.check(&sample) {
            Ok(at) => at,
            Err(e) => {
                warn!(source = "primary", error = %e, "dropping sample");
                self.shared.stats().record_dropped_sample();
                return Ok(StepOutcome::dropped(e));
            }
        };
        self.shared.stats().record_sample(SourceKind::Primary);

        let now_ms = sample.arrival_ms;
        let mut outcome = StepOutcome::default();

        if let Some(window) = self.activity_window.push(sample).ready() {
            let specialized = self.classify_activity(&window).map_err(fatal)?;
            let (activity, committed) = self.shared.commit_activity(&specialized, now_ms, at);
            debug!(
                window = %self.activity_window.purpose(),
                %specialized,
                %activity,
                "activity decision"
            );
            outcome.committed.extend(committed);
            outcome.activity = Some(activity);
        }

        if let Some(window) = self.respiratory_window.push(sample).ready() {
            let gating_label = outcome
                .activity
                .clone()
                .or_else(|| self.shared.last_activity());

            let label = match gating_label.as_deref() {
                Some(activity) if labels::is_high_motion(activity) => {
                    debug!(%activity, "skipping respiratory classifier during high motion");
                    self.shared.stats().record_respiratory_skip();
                    outcome.respiratory_skipped = true;
                    labels::NORMAL_BREATHING.to_string()
                }
                _ => {
                    self.shared.stats().record_classification();
                    self.respiratory.decide(&window).map_err(fatal)?.label
                }
            };

            let committed = self
                .shared
                .commit(EventKind::RespiratoryState, &label, now_ms, at);
            debug!(window = %self.respiratory_window.purpose(), %label, "respiratory decision");
            outcome.committed.extend(committed);
            outcome.respiratory = Some(label);
        }

        Ok(outcome)
    }

    /// Branch, then specialize. Returns the specialized label before any
    /// cross-sensor substitution.
    fn classify_activity(&mut self, window: &WindowSnapshot) -> Result<String, ClassifierError> {
        let branch = self.branch.decide(window)?;
        self.shared.stats().record_classification();

        let specialist = if branch.label == labels::DYNAMIC {
            &mut self.dynamic_activity
        } else {
            &mut self.static_activity
        };
        let decision = specialist.decide(window)?;
        self.shared.stats().record_classification();

        debug!(
            branch = %branch.label,
            label = %decision.label,
            confidence = decision.confidence,
            "activity cascade"
        );
        Ok(decision.label)
    }
}

/// Secondary-source lane: keeps the sitting/standing label current.
pub struct SecondaryLane {
    admission: Admission,
    window: SlidingWindow,
    classifier: ClassifierPort,
    shared: Arc<PipelineShared>,
}

impl SecondaryLane {
    pub(crate) fn new(classifier: ClassifierPort, max_abs: f32, shared: Arc<PipelineShared>) -> Self {
        let len = classifier.spec().input_length;
        Self {
            admission: Admission::new(SourceKind::Secondary, max_abs, shared.epoch()),
            window: SlidingWindow::new(WindowPurpose::SecondaryAux, len),
            classifier,
            shared,
        }
    }

    /// Feed one secondary sample. Every accepted sample refreshes liveness.
    pub fn push(&mut self, sample: Sample) -> Result<StepOutcome, PipelineError> {
        if let Err(e) = self.admission.check(&sample) {
            warn!(
                source = "secondary",
                window = %self.window.purpose(),
                error = %e,
                "dropping sample"
            );
            self.shared.stats().record_dropped_sample();
            return Ok(StepOutcome::dropped(e));
        }
        self.shared.stats().record_sample(SourceKind::Secondary);

        let now_ms = sample.arrival_ms;
        let label = match self.window.push(sample).ready() {
            Some(window) => {
                self.shared.stats().record_classification();
                Some(self.classifier.decide(&window).map_err(fatal)?.label)
            }
            None => None,
        };

        self.shared.record_secondary(now_ms, label.clone());

        Ok(StepOutcome {
            secondary_aux: label,
            ..StepOutcome::default()
        })
    }
}

fn fatal(e: ClassifierError) -> PipelineError {
    error!(error = %e, "classifier failure, stopping lane");
    PipelineError::Classifier(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_disambiguation_uses_live_secondary() {
        let mut state = CascadeState::new(FreshnessGate::new(Duration::from_secs(1)));
        state.last_secondary_aux_label = Some(labels::STANDING.to_string());
        state.secondary_freshness.touch(1_000);

        assert_eq!(
            state.disambiguate(labels::SITTING_STANDING, 1_500),
            labels::STANDING
        );
    }

    #[test]
    fn test_disambiguation_falls_back_when_stale() {
        let mut state = CascadeState::new(FreshnessGate::new(Duration::from_secs(1)));
        state.last_secondary_aux_label = Some(labels::SITTING.to_string());
        state.secondary_freshness.touch(1_000);

        assert_eq!(
            state.disambiguate(labels::SITTING_STANDING, 2_000),
            labels::SITTING_STANDING
        );
    }

    #[test]
    fn test_disambiguation_ignores_other_classes() {
        let mut state = CascadeState::new(FreshnessGate::new(Duration::from_secs(1)));
        state.last_secondary_aux_label = Some(labels::SITTING.to_string());
        state.secondary_freshness.touch(1_000);

        assert_eq!(state.disambiguate(labels::LYING_LEFT, 1_100), labels::LYING_LEFT);
    }

    #[test]
    fn test_disambiguation_without_aux_label() {
        let mut state = CascadeState::new(FreshnessGate::new(Duration::from_secs(1)));
        state.secondary_freshness.touch(1_000);

        assert_eq!(
            state.disambiguate(labels::SITTING_STANDING, 1_100),
            labels::SITTING_STANDING
        );
    }

    #[test]
    fn test_admission_rejects_out_of_order() {
        let mut admission = Admission::new(SourceKind::Primary, 16.0, Utc::now());
        assert!(admission.check(&Sample::primary(0.0, 0.0, 1.0, 100)).is_ok());
        assert!(admission.check(&Sample::primary(0.0, 0.0, 1.0, 100)).is_ok());
        assert!(matches!(
            admission.check(&Sample::primary(0.0, 0.0, 1.0, 50)),
            Err(SampleError::OutOfOrder { .. })
        ));
        assert!(matches!(
            admission.check(&Sample::secondary(0.0, 0.0, 1.0, 200)),
            Err(SampleError::WrongSource { .. })
        ));
    }

    #[test]
    fn test_admission_rejects_unrepresentable_arrival() {
        let epoch = Utc::now();
        let mut admission = Admission::new(SourceKind::Primary, 16.0, epoch);

        assert_eq!(
            admission.check(&Sample::primary(0.0, 0.0, 1.0, 2_000)),
            Ok(epoch + chrono::Duration::milliseconds(2_000))
        );
        for arrival_ms in [10_000_000_000_000_000, u64::MAX] {
            assert_eq!(
                admission.check(&Sample::primary(0.0, 0.0, 1.0, arrival_ms)),
                Err(SampleError::ClockOverflow { arrival_ms })
            );
        }
        // A rejected sample does not advance the order check.
        assert!(admission.check(&Sample::primary(0.0, 0.0, 1.0, 2_500)).is_ok());
    }
}
