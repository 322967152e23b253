//! Session counters for the pipeline.

pub mod log;

pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, PipelineStats, SharedStats,
    StatsSnapshot,
};
