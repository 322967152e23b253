//! Pipeline assembly, shared cross-lane state, and the threaded runtime.
//!
//! Each lane owns its windows and classifiers. The only state both lanes
//! touch is [`PipelineShared`]: the cascade state and the two debounce filters
//! sit behind a single mutex, and the event sink is reached through its
//! queue. Inference always runs outside the lock.

use crate::config::{check_pipeline_limits, Config};
use crate::core::cascade::{CascadeModels, CascadeState, PrimaryLane, SecondaryLane, StepOutcome};
use crate::core::classifier::{ClassifierError, ClassifierPort};
use crate::core::debounce::DebounceFilter;
use crate::core::events::{CommittedEvent, EventKind, EventRecord};
use crate::core::freshness::FreshnessGate;
use crate::model::ModelError;
use crate::sink::{EventSink, EventStore};
use crate::source::types::{Sample, SourceKind};
use crate::stats::{create_shared_stats, SharedStats};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// Callback for live display of committed transitions.
pub type DisplayCallback = Box<dyn Fn(&CommittedEvent) + Send + Sync>;

/// Which decisions reach the event store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Persist every cascade decision; debounce only governs the display.
    #[default]
    EveryDecision,
    /// Persist debounce accepts only.
    CommittedOnly,
}

struct SharedState {
    cascade: CascadeState,
    activity: DebounceFilter,
    respiratory: DebounceFilter,
}

impl SharedState {
    fn filter(&mut self, kind: EventKind) -> &mut DebounceFilter {
        match kind {
            EventKind::Activity => &mut self.activity,
            EventKind::RespiratoryState => &mut self.respiratory,
        }
    }
}

/// Wall-clock time `now_ms` after `epoch`, if chrono can represent it.
pub(crate) fn wall_clock_at(epoch: DateTime<Utc>, now_ms: u64) -> Option<DateTime<Utc>> {
    let ms = i64::try_from(now_ms).ok()?;
    epoch.checked_add_signed(chrono::Duration::try_milliseconds(ms)?)
}

/// State and outputs shared by both lanes.
pub struct PipelineShared {
    state: Mutex<SharedState>,
    sink: EventSink,
    display: Option<DisplayCallback>,
    policy: PersistencePolicy,
    epoch: DateTime<Utc>,
    session_id: Uuid,
    stats: SharedStats,
}

impl PipelineShared {
    fn lock(&self) -> MutexGuard<'_, SharedState> {
        // A panicking lane cannot leave the state half-written: every update
        // is a plain field assignment.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session id stamped on every persisted record.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Counters updated by both lanes and the sink writer.
    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Wall-clock time of arrival time zero.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Convert a monotonic arrival time into a wall-clock timestamp.
    ///
    /// `None` when the result is outside chrono's range; lanes reject such
    /// samples on admission.
    pub fn wall_clock(&self, now_ms: u64) -> Option<DateTime<Utc>> {
        wall_clock_at(self.epoch, now_ms)
    }

    /// Copy of the current cascade state.
    pub fn cascade_state(&self) -> CascadeState {
        self.lock().cascade.clone()
    }

    /// Activity label most recently resolved by the primary lane.
    pub fn last_activity(&self) -> Option<String> {
        self.lock().cascade.last_primary_activity_label.clone()
    }

    /// Label most recently accepted by the debounce filter for `kind`.
    pub fn current_label(&self, kind: EventKind) -> Option<String> {
        self.lock().filter(kind).last_label().map(str::to_string)
    }

    /// Resolve the activity label against the secondary source, record it and
    /// debounce it, all under one lock.
    pub(crate) fn commit_activity(
        &self,
        specialized: &str,
        now_ms: u64,
        at: DateTime<Utc>,
    ) -> (String, Option<CommittedEvent>) {
        let (label, event) = {
            let mut state = self.lock();
            let label = state.cascade.disambiguate(specialized, now_ms);
            state.cascade.last_primary_activity_label = Some(label.clone());
            let event = state.activity.offer(&label, now_ms, at);
            (label, event)
        };

        self.publish(EventKind::Activity, &label, at, event.as_ref());
        (label, event)
    }

    /// Debounce and publish a label of `kind`.
    pub(crate) fn commit(
        &self,
        kind: EventKind,
        label: &str,
        now_ms: u64,
        at: DateTime<Utc>,
    ) -> Option<CommittedEvent> {
        let event = self.lock().filter(kind).offer(label, now_ms, at);
        self.publish(kind, label, at, event.as_ref());
        event
    }

    /// Mark the secondary source live and cache its latest label.
    pub(crate) fn record_secondary(&self, now_ms: u64, label: Option<String>) {
        let mut state = self.lock();
        state.cascade.secondary_freshness.touch(now_ms);
        if label.is_some() {
            state.cascade.last_secondary_aux_label = label;
        }
    }

    fn publish(
        &self,
        kind: EventKind,
        label: &str,
        at: DateTime<Utc>,
        committed: Option<&CommittedEvent>,
    ) {
        if let Some(event) = committed {
            self.stats.record_committed_event();
            info!(%kind, label = %event.label, "state changed");
            if let Some(display) = &self.display {
                display(event);
            }
        }

        let persist = match self.policy {
            PersistencePolicy::EveryDecision => true,
            PersistencePolicy::CommittedOnly => committed.is_some(),
        };
        if persist {
            let record = EventRecord::new(self.session_id, kind, label, at, committed.is_some());
            // Failures are logged and counted by the sink.
            let _ = self.sink.append(record);
        }
    }

    fn close_sink(&self) {
        self.sink.close();
    }
}

/// Builder for a [`Pipeline`].
pub struct PipelineBuilder {
    branch: Option<ClassifierPort>,
    static_activity: Option<ClassifierPort>,
    dynamic_activity: Option<ClassifierPort>,
    secondary_aux: Option<ClassifierPort>,
    respiratory: Option<ClassifierPort>,
    store: Option<Box<dyn EventStore>>,
    display: Option<DisplayCallback>,
    debounce_dwell: Duration,
    liveness_window: Duration,
    max_abs_acceleration: f32,
    policy: PersistencePolicy,
    sink_queue_capacity: usize,
    lane_queue_capacity: usize,
    epoch: Option<DateTime<Utc>>,
    stats: Option<SharedStats>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            branch: None,
            static_activity: None,
            dynamic_activity: None,
            secondary_aux: None,
            respiratory: None,
            store: None,
            display: None,
            debounce_dwell: Duration::from_millis(1000),
            liveness_window: Duration::from_millis(1000),
            max_abs_acceleration: 16.0,
            policy: PersistencePolicy::default(),
            sink_queue_capacity: 1024,
            lane_queue_capacity: 1024,
            epoch: None,
            stats: None,
        }
    }
}

impl PipelineBuilder {
    /// Take timing, validation and queue settings from a [`Config`].
    pub fn settings(mut self, config: &Config) -> Self {
        self.debounce_dwell = config.debounce_dwell;
        self.liveness_window = config.liveness_window;
        self.max_abs_acceleration = config.max_abs_acceleration;
        self.policy = config.persistence;
        self.sink_queue_capacity = config.sink_queue_capacity;
        self.lane_queue_capacity = config.lane_queue_capacity;
        self
    }

    /// Dynamic/Static branch classifier.
    pub fn branch(mut self, port: ClassifierPort) -> Self {
        self.branch = Some(port);
        self
    }

    /// Specialist for static postures.
    pub fn static_activity(mut self, port: ClassifierPort) -> Self {
        self.static_activity = Some(port);
        self
    }

    /// Specialist for dynamic activities.
    pub fn dynamic_activity(mut self, port: ClassifierPort) -> Self {
        self.dynamic_activity = Some(port);
        self
    }

    /// Sitting/Standing classifier for the secondary source.
    pub fn secondary_aux(mut self, port: ClassifierPort) -> Self {
        self.secondary_aux = Some(port);
        self
    }

    /// Respiratory state classifier.
    pub fn respiratory(mut self, port: ClassifierPort) -> Self {
        self.respiratory = Some(port);
        self
    }

    /// Set all five classifiers at once.
    pub fn models(self, models: CascadeModels) -> Self {
        self.branch(models.branch)
            .static_activity(models.static_activity)
            .dynamic_activity(models.dynamic_activity)
            .secondary_aux(models.secondary_aux)
            .respiratory(models.respiratory)
    }

    /// Backend the sink writer appends records to. Required.
    pub fn store(mut self, store: impl EventStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Called with every debounce accept, on the lane that produced it.
    pub fn display(mut self, callback: impl Fn(&CommittedEvent) + Send + Sync + 'static) -> Self {
        self.display = Some(Box::new(callback));
        self
    }

    /// Minimum time between two committed labels of one kind.
    pub fn debounce_dwell(mut self, dwell: Duration) -> Self {
        self.debounce_dwell = dwell;
        self
    }

    /// How long a secondary sample keeps that source live.
    pub fn liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    /// Per-axis magnitude above which samples are dropped.
    pub fn max_abs_acceleration(mut self, limit: f32) -> Self {
        self.max_abs_acceleration = limit;
        self
    }

    /// Which decisions reach the store.
    pub fn persistence(mut self, policy: PersistencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Wall-clock time corresponding to arrival time zero.
    pub fn epoch(mut self, epoch: DateTime<Utc>) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Counters to update. A fresh set is created when unset.
    pub fn stats(mut self, stats: SharedStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Samples each lane may queue before `send` blocks in [`Pipeline::spawn`].
    pub fn lane_queue_capacity(mut self, capacity: usize) -> Self {
        self.lane_queue_capacity = capacity;
        self
    }

    /// Records the sink may queue before appends are dropped.
    pub fn sink_queue_capacity(mut self, capacity: usize) -> Self {
        self.sink_queue_capacity = capacity;
        self
    }

    /// Validate the configuration and assemble both lanes.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let models = CascadeModels::new(
            self.branch.ok_or(PipelineError::MissingModel("branch"))?,
            self.static_activity
                .ok_or(PipelineError::MissingModel("static"))?,
            self.dynamic_activity
                .ok_or(PipelineError::MissingModel("dynamic"))?,
            self.secondary_aux
                .ok_or(PipelineError::MissingModel("secondary_aux"))?,
            self.respiratory
                .ok_or(PipelineError::MissingModel("respiratory"))?,
        )?;
        let store = self
            .store
            .ok_or_else(|| PipelineError::Config("no event store configured".to_string()))?;
        check_pipeline_limits(
            self.max_abs_acceleration,
            self.sink_queue_capacity,
            self.lane_queue_capacity,
        )
        .map_err(PipelineError::Config)?;

        let stats = self.stats.unwrap_or_else(create_shared_stats);
        let session_id = Uuid::new_v4();

        let shared = Arc::new(PipelineShared {
            state: Mutex::new(SharedState {
                cascade: CascadeState::new(FreshnessGate::new(self.liveness_window)),
                activity: DebounceFilter::new(EventKind::Activity, self.debounce_dwell),
                respiratory: DebounceFilter::new(EventKind::RespiratoryState, self.debounce_dwell),
            }),
            sink: EventSink::spawn(store, self.sink_queue_capacity, stats.clone()),
            display: self.display,
            policy: self.policy,
            epoch: self.epoch.unwrap_or_else(Utc::now),
            session_id,
            stats,
        });

        info!(
            %session_id,
            activity_window = models.activity_window_len(),
            respiratory_window = models.respiratory_window_len(),
            secondary_window = models.secondary_window_len(),
            "pipeline assembled"
        );

        let CascadeModels {
            branch,
            static_activity,
            dynamic_activity,
            secondary_aux,
            respiratory,
        } = models;

        Ok(Pipeline {
            primary: PrimaryLane::new(
                branch,
                static_activity,
                dynamic_activity,
                respiratory,
                self.max_abs_acceleration,
                shared.clone(),
            ),
            secondary: SecondaryLane::new(secondary_aux, self.max_abs_acceleration, shared.clone()),
            shared,
            lane_queue_capacity: self.lane_queue_capacity,
        })
    }
}

/// Both lanes plus their shared state, driven by the caller.
pub struct Pipeline {
    primary: PrimaryLane,
    secondary: SecondaryLane,
    shared: Arc<PipelineShared>,
    lane_queue_capacity: usize,
}

impl Pipeline {
    /// Start a builder with default timing and queue settings.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// State shared by both lanes.
    pub fn shared(&self) -> &Arc<PipelineShared> {
        &self.shared
    }

    /// Route a sample to its lane on the calling thread.
    pub fn push(&mut self, sample: Sample) -> Result<StepOutcome, PipelineError> {
        match sample.source {
            SourceKind::Primary => self.primary.push(sample),
            SourceKind::Secondary => self.secondary.push(sample),
        }
    }

    /// Run each lane on its own thread behind a bounded queue.
    pub fn spawn(self) -> PipelineHandle {
        let (primary_tx, primary_rx) = bounded(self.lane_queue_capacity);
        let (secondary_tx, secondary_rx) = bounded(self.lane_queue_capacity);

        let mut primary = self.primary;
        let mut secondary = self.secondary;

        PipelineHandle {
            primary_tx: Some(primary_tx),
            secondary_tx: Some(secondary_tx),
            primary_thread: Some(spawn_lane(SourceKind::Primary, primary_rx, move |s| {
                primary.push(s)
            })),
            secondary_thread: Some(spawn_lane(
                SourceKind::Secondary,
                secondary_rx,
                move |s| secondary.push(s),
            )),
            shared: self.shared,
        }
    }

    /// Release the classifiers, then drain and close the event sink.
    pub fn shutdown(self) {
        let shared = self.shared.clone();
        drop(self);
        shared.close_sink();
    }
}

fn spawn_lane<F>(
    source: SourceKind,
    receiver: Receiver<Sample>,
    mut push: F,
) -> thread::JoinHandle<Result<(), PipelineError>>
where
    F: FnMut(Sample) -> Result<StepOutcome, PipelineError> + Send + 'static,
{
    thread::spawn(move || {
        info!(%source, "lane started");
        for sample in receiver.iter() {
            if let Err(e) = push(sample) {
                error!(%source, error = %e, "lane stopped");
                return Err(e);
            }
        }
        info!(%source, "lane drained");
        Ok(())
    })
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    primary_tx: Option<Sender<Sample>>,
    secondary_tx: Option<Sender<Sample>>,
    primary_thread: Option<thread::JoinHandle<Result<(), PipelineError>>>,
    secondary_thread: Option<thread::JoinHandle<Result<(), PipelineError>>>,
    shared: Arc<PipelineShared>,
}

impl PipelineHandle {
    /// Delivery channel for primary-source samples.
    ///
    /// Clones must be dropped before [`shutdown`](Self::shutdown) can finish.
    pub fn primary_sender(&self) -> Option<Sender<Sample>> {
        self.primary_tx.clone()
    }

    /// Delivery channel for secondary-source samples.
    pub fn secondary_sender(&self) -> Option<Sender<Sample>> {
        self.secondary_tx.clone()
    }

    /// State shared by both running lanes.
    pub fn shared(&self) -> &Arc<PipelineShared> {
        &self.shared
    }

    /// Close both lanes, wait for queued samples to be processed, release the
    /// classifiers and flush the event sink.
    ///
    /// Returns the first fatal lane error, if any.
    pub fn shutdown(mut self) -> Result<(), PipelineError> {
        self.primary_tx.take();
        self.secondary_tx.take();

        let primary = join_lane(SourceKind::Primary, self.primary_thread.take());
        let secondary = join_lane(SourceKind::Secondary, self.secondary_thread.take());

        self.shared.close_sink();
        info!(session_id = %self.shared.session_id, "pipeline shut down");

        primary.and(secondary)
    }
}

fn join_lane(
    source: SourceKind,
    handle: Option<thread::JoinHandle<Result<(), PipelineError>>>,
) -> Result<(), PipelineError> {
    match handle {
        Some(handle) => handle
            .join()
            .unwrap_or(Err(PipelineError::LanePanicked(source))),
        None => Ok(()),
    }
}

/// Pipeline failures. Everything here is fatal; transient sample and
/// persistence problems are logged and never surface as errors.
#[derive(Debug)]
pub enum PipelineError {
    MissingModel(&'static str),
    Config(String),
    Model(ModelError),
    Classifier(ClassifierError),
    LanePanicked(SourceKind),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::MissingModel(name) => write!(f, "Missing {name} classifier"),
            PipelineError::Config(e) => write!(f, "Configuration error: {e}"),
            PipelineError::Model(e) => write!(f, "Model error: {e}"),
            PipelineError::Classifier(e) => write!(f, "Classifier error: {e}"),
            PipelineError::LanePanicked(source) => write!(f, "{source} lane panicked"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Model(e) => Some(e),
            PipelineError::Classifier(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClassifierError> for PipelineError {
    fn from(e: ClassifierError) -> Self {
        PipelineError::Classifier(e)
    }
}

impl From<ModelError> for PipelineError {
    fn from(e: ModelError) -> Self {
        PipelineError::Model(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::ClassifierSpec;
    use crate::core::labels;
    use crate::core::windowing::WindowSnapshot;
    use crate::sink::MemoryStore;
    use crate::source::types::SampleError;

    fn constant(name: &'static str, len: usize, labels: Vec<String>, index: usize) -> ClassifierPort {
        let classes = labels.len();
        let engine = move |_: &WindowSnapshot| {
            let mut out = vec![0.0; classes];
            out[index] = 1.0;
            out
        };
        ClassifierPort::new(name, ClassifierSpec::new(len, labels), Box::new(engine)).unwrap()
    }

    fn full_builder() -> PipelineBuilder {
        Pipeline::builder()
            .branch(constant("branch", 4, labels::branch_labels(), 1))
            .static_activity(constant("static", 4, labels::static_labels(), 0))
            .dynamic_activity(constant("dynamic", 4, labels::dynamic_labels(), 0))
            .secondary_aux(constant("secondary_aux", 4, labels::secondary_aux_labels(), 0))
            .respiratory(constant("respiratory", 8, labels::respiratory_labels(), 0))
            .store(MemoryStore::new())
    }

    #[test]
    fn test_missing_model_is_fatal() {
        let result = Pipeline::builder()
            .branch(constant("branch", 4, labels::branch_labels(), 1))
            .store(MemoryStore::new())
            .build();
        assert!(matches!(result, Err(PipelineError::MissingModel("static"))));
    }

    #[test]
    fn test_missing_store_is_fatal() {
        let result = Pipeline::builder()
            .branch(constant("branch", 4, labels::branch_labels(), 1))
            .static_activity(constant("static", 4, labels::static_labels(), 0))
            .dynamic_activity(constant("dynamic", 4, labels::dynamic_labels(), 0))
            .secondary_aux(constant("secondary_aux", 4, labels::secondary_aux_labels(), 0))
            .respiratory(constant("respiratory", 8, labels::respiratory_labels(), 0))
            .build();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_mismatched_activity_lengths_are_fatal() {
        let result = full_builder()
            .dynamic_activity(constant("dynamic", 5, labels::dynamic_labels(), 0))
            .build();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_branch_must_be_dynamic_static() {
        let result = full_builder()
            .branch(constant("branch", 4, vec!["a".into(), "b".into()], 0))
            .build();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_wall_clock_offsets_epoch() {
        let epoch = Utc::now();
        let pipeline = full_builder().epoch(epoch).build().unwrap();
        assert_eq!(
            pipeline.shared().wall_clock(1_500),
            Some(epoch + chrono::Duration::milliseconds(1_500))
        );
        assert_eq!(pipeline.shared().wall_clock(u64::MAX), None);
        pipeline.shutdown();
    }

    #[test]
    fn test_builder_limits_match_config_checks() {
        let result = full_builder().max_abs_acceleration(f32::NAN).build();
        assert!(matches!(result, Err(PipelineError::Config(_))));

        let result = full_builder().lane_queue_capacity(0).build();
        assert!(matches!(result, Err(PipelineError::Config(_))));

        let result = full_builder().sink_queue_capacity(0).build();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_unrepresentable_arrival_is_dropped() {
        let mut pipeline = full_builder().build().unwrap();
        for arrival_ms in [10_000_000_000_000_000, u64::MAX] {
            let outcome = pipeline
                .push(Sample::primary(0.0, 0.0, 1.0, arrival_ms))
                .unwrap();
            assert_eq!(outcome.dropped, Some(SampleError::ClockOverflow { arrival_ms }));

            let outcome = pipeline
                .push(Sample::secondary(0.0, 0.0, 1.0, arrival_ms))
                .unwrap();
            assert_eq!(outcome.dropped, Some(SampleError::ClockOverflow { arrival_ms }));
        }
        assert_eq!(pipeline.shared().stats().stats().dropped_samples, 4);
        assert!(pipeline
            .shared()
            .cascade_state()
            .secondary_freshness
            .last_touch_ms()
            .is_none());
        pipeline.shutdown();
    }

    #[test]
    fn test_secondary_touch_on_every_sample() {
        let mut pipeline = full_builder().build().unwrap();
        pipeline.push(Sample::secondary(0.0, 0.0, 1.0, 100)).unwrap();

        let state = pipeline.shared().cascade_state();
        assert_eq!(state.secondary_freshness.last_touch_ms(), Some(100));
        assert!(state.last_secondary_aux_label.is_none());
        pipeline.shutdown();
    }
}
