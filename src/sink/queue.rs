//! Non-blocking front end of the event store.
//!
//! Lanes hand records to a bounded queue and return immediately; a
//! background thread owns the store and does all the I/O. The writer flushes
//! whenever it catches up with the queue, so readers see every record that
//! has been written. A record that cannot be queued or written is logged and
//! dropped, never retried.

use crate::core::events::EventRecord;
use crate::sink::store::{EventStore, StoreError};
use crate::stats::SharedStats;
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::{Mutex, PoisonError};
use std::thread;
use tracing::{debug, warn};

enum SinkMessage {
    Record(EventRecord),
    Close,
}

/// Queue plus background writer.
pub struct EventSink {
    sender: Sender<SinkMessage>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    stats: SharedStats,
}

impl EventSink {
    /// Start the writer thread.
    pub fn spawn(mut store: Box<dyn EventStore>, capacity: usize, stats: SharedStats) -> Self {
        let (sender, receiver) = bounded::<SinkMessage>(capacity);
        let worker_stats = stats.clone();

        let worker = thread::spawn(move || {
            for message in receiver.iter() {
                match message {
                    SinkMessage::Record(record) => match store.append(&record) {
                        Ok(()) => worker_stats.record_persisted(),
                        Err(e) => {
                            warn!(
                                kind = %record.kind,
                                label = %record.label,
                                error = %e,
                                "dropping event record"
                            );
                            worker_stats.record_persist_failure();
                        }
                    },
                    SinkMessage::Close => break,
                }
                if receiver.is_empty() {
                    if let Err(e) = store.flush() {
                        warn!(error = %e, "failed to flush event store");
                    }
                }
            }
            if let Err(e) = store.flush() {
                warn!(error = %e, "failed to flush event store");
            }
            debug!("event sink writer stopped");
        });

        Self {
            sender,
            worker: Mutex::new(Some(worker)),
            stats,
        }
    }

    /// Queue a record without blocking.
    pub fn append(&self, record: EventRecord) -> Result<(), StoreError> {
        let error = match self.sender.try_send(SinkMessage::Record(record)) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(_)) => StoreError::QueueFull,
            Err(TrySendError::Disconnected(_)) => StoreError::Closed,
        };
        warn!(error = %error, "dropping event record");
        self.stats.record_persist_failure();
        Err(error)
    }

    /// Write out everything already queued, then stop the writer.
    ///
    /// Idempotent. Records appended afterwards are dropped.
    pub fn close(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            // Blocking send: the close marker must land behind queued records.
            let _ = self.sender.send(SinkMessage::Close);
            if worker.join().is_err() {
                warn!("event sink writer panicked");
            }
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventKind;
    use crate::sink::store::{read_records, JsonlStore, MemoryStore};
    use crate::stats::create_shared_stats;
    use chrono::Utc;
    use std::time::{Duration, Instant};
    use uuid::Uuid;

    struct FailingStore;

    impl EventStore for FailingStore {
        fn append(&mut self, _record: &EventRecord) -> Result<(), StoreError> {
            Err(StoreError::IoError("disk full".to_string()))
        }
    }

    fn record(label: &str) -> EventRecord {
        EventRecord::new(Uuid::new_v4(), EventKind::Activity, label, Utc::now(), false)
    }

    #[test]
    fn test_close_drains_queue_in_order() {
        let store = MemoryStore::new();
        let stats = create_shared_stats();
        let sink = EventSink::spawn(Box::new(store.clone()), 64, stats.clone());

        for i in 0..20 {
            sink.append(record(&format!("label-{i}"))).unwrap();
        }
        sink.close();

        let labels: Vec<String> = store.records().into_iter().map(|r| r.label).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("label-{i}")).collect();
        assert_eq!(labels, expected);
        assert_eq!(stats.stats().records_persisted, 20);
    }

    #[test]
    fn test_write_failures_are_counted_not_fatal() {
        let stats = create_shared_stats();
        let sink = EventSink::spawn(Box::new(FailingStore), 8, stats.clone());

        sink.append(record("a")).unwrap();
        sink.append(record("b")).unwrap();
        sink.close();

        assert_eq!(stats.stats().persist_failures, 2);
        assert_eq!(stats.stats().records_persisted, 0);
    }

    #[test]
    fn test_append_after_close_is_dropped() {
        let stats = create_shared_stats();
        let sink = EventSink::spawn(Box::new(MemoryStore::new()), 8, stats.clone());
        sink.close();
        sink.close();

        assert!(matches!(sink.append(record("late")), Err(StoreError::Closed)));
        assert_eq!(stats.stats().persist_failures, 1);
    }

    #[test]
    fn test_records_readable_while_sink_open() {
        let path = std::env::temp_dir()
            .join("wearable-activity-agent-test")
            .join(format!("open-sink-{}.jsonl", Uuid::new_v4()));
        let store = JsonlStore::open(&path).unwrap();
        let sink = EventSink::spawn(Box::new(store), 64, create_shared_stats());

        for i in 0..5 {
            sink.append(record(&format!("label-{i}"))).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut seen = 0;
        while Instant::now() < deadline {
            seen = read_records(&path).unwrap().len();
            if seen == 5 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(seen, 5);

        sink.close();
        let _ = std::fs::remove_file(&path);
    }
}
