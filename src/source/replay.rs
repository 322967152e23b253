//! Replay adapter for recorded sensor sessions.
//!
//! A recording is a JSON-lines file where every line is one [`Sample`]:
//!
//! ```text
//! {"source":"primary","x":0.01,"y":-0.98,"z":0.12,"arrival_ms":40}
//! {"source":"secondary","x":0.40,"y":-0.85,"z":0.30,"arrival_ms":52}
//! ```
//!
//! Playback splits the recording into its two source streams and pushes them
//! into their lanes in recorded arrival order, so the lanes see the two
//! sensors on one shared clock.

use crate::source::types::{Sample, SourceKind};
use crossbeam_channel::Sender;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How fast a recording is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Push samples back to back.
    Unthrottled,
    /// Sleep between samples so delivery follows the recorded arrival times.
    RealTime,
}

/// A recorded two-source session, split per source.
#[derive(Debug, Clone, Default)]
pub struct RecordingSource {
    primary: Vec<Sample>,
    secondary: Vec<Sample>,
    skipped_lines: usize,
}

/// Number of samples delivered to each lane during playback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub primary_delivered: usize,
    pub secondary_delivered: usize,
}

impl RecordingSource {
    /// Load a recording from a JSON-lines file.
    pub fn from_path(path: &Path) -> Result<Self, RecordingError> {
        let file = std::fs::File::open(path).map_err(|e| RecordingError::IoError(e.to_string()))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Parse a recording from any line reader. Malformed lines are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, RecordingError> {
        let mut recording = Self::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| RecordingError::IoError(e.to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Sample>(trimmed) {
                Ok(sample) => recording.push(sample),
                Err(e) => {
                    warn!(line = index + 1, error = %e, "skipping malformed recording line");
                    recording.skipped_lines += 1;
                }
            }
        }

        Ok(recording)
    }

    /// Build a recording from samples already in memory.
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut recording = Self::default();
        for sample in samples {
            recording.push(sample);
        }
        recording
    }

    fn push(&mut self, sample: Sample) {
        match sample.source {
            SourceKind::Primary => self.primary.push(sample),
            SourceKind::Secondary => self.secondary.push(sample),
        }
    }

    /// Number of primary samples in the recording.
    pub fn primary_count(&self) -> usize {
        self.primary.len()
    }

    /// Number of secondary samples in the recording.
    pub fn secondary_count(&self) -> usize {
        self.secondary.len()
    }

    /// Lines that could not be parsed as samples.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Deliver both streams in one arrival-ordered timeline and return once
    /// both are exhausted.
    ///
    /// A lane whose receiver has gone away stops its stream early; the other
    /// stream is unaffected.
    pub fn play(
        self,
        primary: Sender<Sample>,
        secondary: Sender<Sample>,
        pace: Pace,
    ) -> ReplayReport {
        self.play_while(primary, secondary, pace, Arc::new(AtomicBool::new(true)))
    }

    /// Like [`play`](Self::play), but delivery stops as soon as `running` is
    /// cleared.
    ///
    /// Samples go out from the calling thread in `arrival_ms` order, primary
    /// first on ties. With bounded lane queues this keeps the two lanes
    /// within a few samples of each other on the recorded clock, whatever
    /// the pace.
    pub fn play_while(
        self,
        primary: Sender<Sample>,
        secondary: Sender<Sample>,
        pace: Pace,
        running: Arc<AtomicBool>,
    ) -> ReplayReport {
        let mut report = ReplayReport::default();
        let mut primary_open = true;
        let mut secondary_open = true;
        let mut previous_ms: Option<u64> = None;

        for sample in merge_by_arrival(self.primary, self.secondary) {
            if !running.load(Ordering::SeqCst) {
                debug!(?report, "replay interrupted");
                break;
            }

            let (sender, open, delivered) = match sample.source {
                SourceKind::Primary => (&primary, &mut primary_open, &mut report.primary_delivered),
                SourceKind::Secondary => {
                    (&secondary, &mut secondary_open, &mut report.secondary_delivered)
                }
            };
            if !*open {
                continue;
            }

            if pace == Pace::RealTime {
                if let Some(prev) = previous_ms {
                    let gap = sample.arrival_ms.saturating_sub(prev);
                    thread::sleep(Duration::from_millis(gap));
                }
                previous_ms = Some(sample.arrival_ms);
            }

            if sender.send(sample).is_err() {
                warn!(source = %sample.source, delivered = *delivered, "lane closed during replay");
                *open = false;
                if !primary_open && !secondary_open {
                    break;
                }
                continue;
            }
            *delivered += 1;
        }

        debug!(?report, "replay finished");
        report
    }
}

/// Interleave two per-source streams by arrival time, keeping each stream's
/// own order.
fn merge_by_arrival(primary: Vec<Sample>, secondary: Vec<Sample>) -> Vec<Sample> {
    let mut merged = Vec::with_capacity(primary.len() + secondary.len());
    let mut primary = primary.into_iter().peekable();
    let mut secondary = secondary.into_iter().peekable();

    loop {
        let take_primary = match (primary.peek(), secondary.peek()) {
            (Some(p), Some(s)) => p.arrival_ms <= s.arrival_ms,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_primary {
            primary.next()
        } else {
            secondary.next()
        };
        merged.extend(next);
    }
    merged
}

/// Errors reading a recording.
#[derive(Debug)]
pub enum RecordingError {
    IoError(String),
}

impl std::fmt::Display for RecordingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingError::IoError(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for RecordingError {}
