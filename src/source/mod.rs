//! Sample sources for the two ingestion lanes.
//!
//! Live sensor transport is handled outside this crate. What lives here is the
//! sample contract every adapter produces, plus a replay adapter that feeds a
//! recorded session back through a running pipeline.

pub mod replay;
pub mod types;

pub use replay::{Pace, RecordingError, RecordingSource, ReplayReport};
pub use types::{Sample, SampleError, SourceKind};
