//! Liveness tracking for the secondary source.

use std::time::Duration;

/// Records when the secondary source was last heard from.
///
/// Liveness is a pure function of elapsed time: the gate never blocks and
/// never waits for data to arrive.
#[derive(Debug, Clone)]
pub struct FreshnessGate {
    liveness_window_ms: u64,
    last_touch_ms: Option<u64>,
}

impl FreshnessGate {
    /// Gate that has never been touched.
    pub fn new(liveness_window: Duration) -> Self {
        Self {
            liveness_window_ms: liveness_window.as_millis() as u64,
            last_touch_ms: None,
        }
    }

    /// Record a secondary-source arrival.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_touch_ms = Some(match self.last_touch_ms {
            Some(prev) => prev.max(now_ms),
            None => now_ms,
        });
    }

    /// True iff the last touch is less than the liveness window away from
    /// `now_ms`.
    ///
    /// Distance is measured in both directions, so a touch a whole window
    /// ahead of `now_ms` does not count.
    pub fn is_live(&self, now_ms: u64) -> bool {
        match self.last_touch_ms {
            Some(last) => now_ms.abs_diff(last) < self.liveness_window_ms,
            None => false,
        }
    }

    /// Arrival time of the latest touch.
    pub fn last_touch_ms(&self) -> Option<u64> {
        self.last_touch_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_touched_is_not_live() {
        let gate = FreshnessGate::new(Duration::from_secs(1));
        assert!(!gate.is_live(0));
        assert!(!gate.is_live(10_000));
    }

    #[test]
    fn test_live_within_window() {
        let mut gate = FreshnessGate::new(Duration::from_secs(1));
        gate.touch(5_000);

        assert!(gate.is_live(5_000));
        assert!(gate.is_live(5_999));
        assert!(!gate.is_live(6_000));
        assert!(!gate.is_live(9_000));
    }

    #[test]
    fn test_touch_slightly_ahead_is_live() {
        let mut gate = FreshnessGate::new(Duration::from_millis(500));
        gate.touch(1_200);
        assert!(gate.is_live(1_000));
    }

    #[test]
    fn test_touch_far_ahead_is_not_live() {
        let mut gate = FreshnessGate::new(Duration::from_secs(1));
        gate.touch(100_000);

        assert!(!gate.is_live(1_100));
        assert!(!gate.is_live(99_000));
        assert!(gate.is_live(99_001));
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut gate = FreshnessGate::new(Duration::from_millis(500));
        gate.touch(2_000);
        gate.touch(1_000);
        assert_eq!(gate.last_touch_ms(), Some(2_000));
    }
}
