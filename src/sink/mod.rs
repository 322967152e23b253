//! Event persistence.
//!
//! [`EventSink`] is what the pipeline talks to; [`EventStore`] is the durable
//! backend behind it.

pub mod queue;
pub mod store;

pub use queue::EventSink;
pub use store::{read_records, EventStore, JsonlStore, MemoryStore, StoreError};
