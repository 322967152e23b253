//! Core functionality for the activity agent.
//!
//! This module contains:
//! - Sliding windows over each sample stream
//! - The classifier port and the label tables of the five cascade stages
//! - The cascade itself, split into a primary and a secondary lane
//! - Debouncing, secondary-source freshness and pipeline assembly

pub mod cascade;
pub mod classifier;
pub mod debounce;
pub mod events;
pub mod freshness;
pub mod labels;
pub mod pipeline;
pub mod windowing;

// Re-export commonly used types
pub use cascade::{CascadeModels, CascadeState, PrimaryLane, SecondaryLane, StepOutcome};
pub use classifier::{argmax, Classifier, ClassifierError, ClassifierPort, ClassifierSpec, Decision};
pub use debounce::DebounceFilter;
pub use events::{CommittedEvent, EventKind, EventRecord};
pub use freshness::FreshnessGate;
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineError, PipelineHandle, PipelineShared, PersistencePolicy,
};
pub use windowing::{SlidingWindow, WindowPurpose, WindowSnapshot, WindowUpdate};
