//! Fixed-capacity sliding windows over one sample stream.
//!
//! Each window advances one sample at a time, so consecutive snapshots overlap
//! by `capacity - 1` samples. Several windows of different sizes can be fed
//! from the same stream; each evicts on its own schedule.

use crate::source::types::Sample;
use std::collections::VecDeque;
use std::sync::Arc;

/// What a window is used for. Only used for logging and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPurpose {
    Activity,
    Respiratory,
    SecondaryAux,
}

impl std::fmt::Display for WindowPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowPurpose::Activity => f.write_str("activity"),
            WindowPurpose::Respiratory => f.write_str("respiratory"),
            WindowPurpose::SecondaryAux => f.write_str("secondary_aux"),
        }
    }
}

/// Read-only copy of a full window, oldest sample first.
///
/// Cloning a snapshot is cheap; the samples are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    samples: Arc<[Sample]>,
}

impl WindowSnapshot {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in the window, oldest first.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Arrival time of the newest sample.
    pub fn end_ms(&self) -> Option<u64> {
        self.samples.last().map(|s| s.arrival_ms)
    }

    /// Samples flattened row-major into `[x0, y0, z0, x1, y1, z1, ...]`,
    /// the (N, 3) layout inference engines expect.
    pub fn to_row_major(&self) -> Vec<f32> {
        self.samples.iter().flat_map(|s| s.axes()).collect()
    }
}

/// Result of pushing one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowUpdate {
    /// Not enough samples yet.
    Pending,
    /// The window is full; this is its current content.
    Ready(WindowSnapshot),
}

impl WindowUpdate {
    /// The snapshot, if the window was full.
    pub fn ready(self) -> Option<WindowSnapshot> {
        match self {
            WindowUpdate::Ready(snapshot) => Some(snapshot),
            WindowUpdate::Pending => None,
        }
    }
}

/// FIFO of the most recent `capacity` samples.
#[derive(Debug)]
pub struct SlidingWindow {
    purpose: WindowPurpose,
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl SlidingWindow {
    /// Create an empty window. Capacity is fixed for the window's lifetime.
    pub fn new(purpose: WindowPurpose, capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be positive");
        Self {
            purpose,
            capacity,
            samples: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// What the window feeds, used to tag log lines.
    pub fn purpose(&self) -> WindowPurpose {
        self.purpose
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True once the window holds `capacity` samples.
    pub fn is_ready(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Append a sample, evicting the oldest one once the window is full.
    pub fn push(&mut self, sample: Sample) -> WindowUpdate {
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }

        if self.is_ready() {
            WindowUpdate::Ready(self.snapshot())
        } else {
            WindowUpdate::Pending
        }
    }

    fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            samples: self.samples.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: u64) -> Sample {
        Sample::primary(i as f32, 0.0, 0.0, i)
    }

    #[test]
    fn test_pending_until_full() {
        let mut window = SlidingWindow::new(WindowPurpose::Activity, 3);

        assert_eq!(window.push(sample(0)), WindowUpdate::Pending);
        assert_eq!(window.push(sample(1)), WindowUpdate::Pending);
        assert!(!window.is_ready());

        let snapshot = window.push(sample(2)).ready().unwrap();
        assert_eq!(snapshot.len(), 3);
        assert!(window.is_ready());
    }

    #[test]
    fn test_snapshot_holds_last_n_in_order() {
        let capacity = 5;
        let mut window = SlidingWindow::new(WindowPurpose::Activity, capacity);

        for k in 0..40u64 {
            let update = window.push(sample(k));
            let pushed = k as usize + 1;
            if pushed < capacity {
                assert_eq!(update, WindowUpdate::Pending);
                continue;
            }
            let snapshot = update.ready().unwrap();
            let arrivals: Vec<u64> = snapshot.samples().iter().map(|s| s.arrival_ms).collect();
            let expected: Vec<u64> = (k + 1 - capacity as u64..=k).collect();
            assert_eq!(arrivals, expected);
            assert_eq!(window.len(), capacity);
        }
    }

    #[test]
    fn test_snapshot_is_independent_of_later_pushes() {
        let mut window = SlidingWindow::new(WindowPurpose::Respiratory, 2);
        window.push(sample(0));
        let first = window.push(sample(1)).ready().unwrap();
        window.push(sample(2));

        assert_eq!(first.end_ms(), Some(1));
        assert_eq!(first.samples()[0].arrival_ms, 0);
    }

    #[test]
    fn test_windows_of_different_sizes_evolve_independently() {
        let mut short = SlidingWindow::new(WindowPurpose::Activity, 2);
        let mut long = SlidingWindow::new(WindowPurpose::Respiratory, 4);

        let mut short_ready = 0;
        let mut long_ready = 0;
        for k in 0..6 {
            if short.push(sample(k)).ready().is_some() {
                short_ready += 1;
            }
            if long.push(sample(k)).ready().is_some() {
                long_ready += 1;
            }
        }

        assert_eq!(short_ready, 5);
        assert_eq!(long_ready, 3);
    }

    #[test]
    fn test_row_major_layout() {
        let mut window = SlidingWindow::new(WindowPurpose::SecondaryAux, 2);
        window.push(Sample::secondary(1.0, 2.0, 3.0, 0));
        let snapshot = window.push(Sample::secondary(4.0, 5.0, 6.0, 1)).ready().unwrap();

        assert_eq!(snapshot.to_row_major(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
