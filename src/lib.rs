//! Wearable Activity Agent - two-sensor activity and respiratory classification.
//!
//! This library turns two streams of tri-axial accelerometer samples into
//! debounced activity and respiratory-state labels.
//!
//! # Pipeline
//!
//! - **Primary source**: drives the activity cascade (branch, then the static
//!   or dynamic specialist) and the respiratory classifier
//! - **Secondary source**: classifies sitting vs standing, used to split the
//!   combined `Sitting/Standing` class while the source is live
//! - **Respiratory gating**: high-motion activities report `Normal` without
//!   running the respiratory model
//! - **Debounce**: a label change is committed only after a minimum dwell
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Wearable Activity Agent                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐       │
//! │  │ Primary  │──▶│ Windows  │──▶│ Cascade  │──▶│ Debounce │──┐    │
//! │  │  source  │   │ (50/100) │   │ + resp.  │   │ filters  │  │    │
//! │  └──────────┘   └──────────┘   └──────────┘   └──────────┘  │    │
//! │                                     ▲                       ▼    │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐   │
//! │  │Secondary │──▶│  Window  │──▶│ Sit/stand│   │  Event sink  │   │
//! │  │  source  │   │   (50)   │   │ + fresh. │   │ (JSON lines) │   │
//! │  └──────────┘   └──────────┘   └──────────┘   └──────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use wearable_activity_agent::{model, Config, JsonlStore, Pipeline};
//!
//! let config = Config::load().expect("config");
//! let models = model::load_cascade(&config.models).expect("models");
//! let handle = Pipeline::builder()
//!     .settings(&config)
//!     .models(models)
//!     .store(JsonlStore::open(&config.store_path).expect("store"))
//!     .display(|event| println!("{} -> {}", event.kind, event.label))
//!     .build()
//!     .expect("pipeline")
//!     .spawn();
//!
//! // Feed samples through handle.primary_sender() / handle.secondary_sender()
//! handle.shutdown().expect("clean shutdown");
//! ```

pub mod config;
pub mod core;
pub mod history;
pub mod model;
pub mod sink;
pub mod source;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, ModelPaths};
pub use core::{
    CascadeModels, ClassifierPort, ClassifierSpec, CommittedEvent, EventKind, EventRecord,
    PersistencePolicy, Pipeline, PipelineError, PipelineHandle,
};
pub use history::DailySummary;
pub use model::{LinearModel, ModelError};
pub use sink::{EventSink, EventStore, JsonlStore, MemoryStore, StoreError};
pub use source::{RecordingSource, Sample, SampleError, SourceKind};
pub use stats::{PipelineStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
