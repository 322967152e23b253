//! Accelerometer sample types shared by both ingestion lanes.
//!
//! A sample carries only the three acceleration axes, the physical source it
//! came from, and a monotonic arrival timestamp supplied by the adapter.

use serde::{Deserialize, Serialize};

/// Which physical sensor produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Torso-worn main sensor. Drives the activity and respiratory cascade.
    Primary,
    /// Auxiliary limb sensor. Only used to split sitting from standing.
    Secondary,
}

impl SourceKind {
    /// Name used in logs and recordings.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Primary => "primary",
            SourceKind::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tri-axial acceleration reading.
///
/// Immutable once constructed; `arrival_ms` is milliseconds on a monotonic
/// clock shared by both sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub source: SourceKind,
    pub arrival_ms: u64,
}

impl Sample {
    /// Create a sample from `source` arriving at `arrival_ms`.
    pub fn new(source: SourceKind, x: f32, y: f32, z: f32, arrival_ms: u64) -> Self {
        Self {
            x,
            y,
            z,
            source,
            arrival_ms,
        }
    }

    /// Create a primary-source sample.
    pub fn primary(x: f32, y: f32, z: f32, arrival_ms: u64) -> Self {
        Self::new(SourceKind::Primary, x, y, z, arrival_ms)
    }

    /// Create a secondary-source sample.
    pub fn secondary(x: f32, y: f32, z: f32, arrival_ms: u64) -> Self {
        Self::new(SourceKind::Secondary, x, y, z, arrival_ms)
    }

    /// The three axes in x, y, z order.
    pub fn axes(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Check that every axis is finite and within `max_abs` (in g).
    pub fn validate(&self, max_abs: f32) -> Result<(), SampleError> {
        for (axis, value) in ['x', 'y', 'z'].into_iter().zip(self.axes()) {
            if !value.is_finite() {
                return Err(SampleError::NonFinite { axis });
            }
            if value.abs() > max_abs {
                return Err(SampleError::OutOfRange {
                    axis,
                    value,
                    limit: max_abs,
                });
            }
        }
        Ok(())
    }
}

/// Reasons a single sample is rejected. None of these stop a lane.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleError {
    NonFinite { axis: char },
    OutOfRange { axis: char, value: f32, limit: f32 },
    OutOfOrder { previous_ms: u64, arrival_ms: u64 },
    WrongSource { expected: SourceKind, actual: SourceKind },
    /// The arrival time has no wall-clock equivalent after the session epoch.
    ClockOverflow { arrival_ms: u64 },
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::NonFinite { axis } => write!(f, "axis {axis} is not finite"),
            SampleError::OutOfRange { axis, value, limit } => {
                write!(f, "axis {axis} value {value} exceeds ±{limit}")
            }
            SampleError::OutOfOrder {
                previous_ms,
                arrival_ms,
            } => write!(
                f,
                "arrival {arrival_ms}ms precedes previous sample at {previous_ms}ms"
            ),
            SampleError::WrongSource { expected, actual } => {
                write!(f, "{actual} sample delivered to {expected} lane")
            }
            SampleError::ClockOverflow { arrival_ms } => {
                write!(f, "arrival {arrival_ms}ms is past the representable clock range")
            }
        }
    }
}

impl std::error::Error for SampleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sample() {
        let sample = Sample::primary(0.1, -0.98, 0.05, 10);
        assert!(sample.validate(16.0).is_ok());
        assert_eq!(sample.axes(), [0.1, -0.98, 0.05]);
    }

    #[test]
    fn test_non_finite_axis_rejected() {
        let sample = Sample::primary(0.0, f32::NAN, 0.0, 10);
        assert_eq!(
            sample.validate(16.0),
            Err(SampleError::NonFinite { axis: 'y' })
        );
    }

    #[test]
    fn test_out_of_range_axis_rejected() {
        let sample = Sample::secondary(0.0, 0.0, -20.0, 10);
        assert!(matches!(
            sample.validate(16.0),
            Err(SampleError::OutOfRange { axis: 'z', .. })
        ));
    }

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_string(&SourceKind::Secondary).unwrap();
        assert_eq!(json, "\"secondary\"");
    }
}
