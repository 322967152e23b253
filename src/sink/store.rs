//! Append-only event stores.

use crate::core::events::EventRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Durable destination for event records. Records are only ever appended.
pub trait EventStore: Send {
    fn append(&mut self, record: &EventRecord) -> Result<(), StoreError>;

    /// Make appended records visible to readers.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// JSON-lines file store, one record per line.
pub struct JsonlStore {
    writer: BufWriter<File>,
}

impl JsonlStore {
    /// Open (or create) the store for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::IoError(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl EventStore for JsonlStore {
    fn append(&mut self, record: &EventRecord) -> Result<(), StoreError> {
        let line =
            serde_json::to_string(record).map_err(|e| StoreError::SerializeError(e.to_string()))?;
        writeln!(self.writer, "{line}").map_err(|e| StoreError::IoError(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.writer
            .flush()
            .map_err(|e| StoreError::IoError(e.to_string()))
    }
}

/// Read every record from a JSON-lines store. Unreadable lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<EventRecord>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| StoreError::IoError(e.to_string()))?;
    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| StoreError::IoError(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = index + 1, error = %e, "skipping unreadable record"),
        }
    }
    Ok(records)
}

/// In-memory store. Clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventStore for MemoryStore {
    fn append(&mut self, record: &EventRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Persistence errors. These are logged and the record is dropped.
#[derive(Debug)]
pub enum StoreError {
    IoError(String),
    SerializeError(String),
    QueueFull,
    Closed,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IoError(e) => write!(f, "IO error: {e}"),
            StoreError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            StoreError::QueueFull => write!(f, "Sink queue is full"),
            StoreError::Closed => write!(f, "Sink is closed"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir()
            .join("wearable-activity-agent-test")
            .join(format!("events-{}.jsonl", Uuid::new_v4()))
    }

    #[test]
    fn test_jsonl_store_appends_across_reopen() {
        let path = temp_store_path();
        let session = Uuid::new_v4();

        {
            let mut store = JsonlStore::open(&path).unwrap();
            store
                .append(&EventRecord::new(session, EventKind::Activity, "Running", Utc::now(), true))
                .unwrap();
            store.flush().unwrap();
        }
        {
            let mut store = JsonlStore::open(&path).unwrap();
            store
                .append(&EventRecord::new(
                    session,
                    EventKind::RespiratoryState,
                    "Normal",
                    Utc::now(),
                    false,
                ))
                .unwrap();
            store.flush().unwrap();
        }

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label, "Running");
        assert_eq!(records[1].kind, EventKind::RespiratoryState);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_read_missing_store_is_empty() {
        let records = read_records(&temp_store_path()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_memory_store_clones_share_records() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        writer
            .append(&EventRecord::new(
                Uuid::new_v4(),
                EventKind::Activity,
                "Sitting",
                Utc::now(),
                true,
            ))
            .unwrap();

        assert_eq!(store.records().len(), 1);
    }
}
