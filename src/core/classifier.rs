//! Classifier port: the uniform call contract around one inference engine.
//!
//! The engine itself is opaque. The port only knows the declared input length
//! and class labels, checks every call against them, and turns the returned
//! probability vector into a label with a deterministic argmax.

use crate::core::windowing::WindowSnapshot;
use serde::{Deserialize, Serialize};

/// Static description of one cascade stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSpec {
    /// Number of samples in one input window.
    pub input_length: usize,
    /// Length of the probability vector the engine returns.
    pub num_classes: usize,
    /// Label for each output index.
    pub class_labels: Vec<String>,
}

impl ClassifierSpec {
    /// Describe a classifier taking `input_length` samples.
    pub fn new(input_length: usize, class_labels: Vec<String>) -> Self {
        Self {
            input_length,
            num_classes: class_labels.len(),
            class_labels,
        }
    }

    /// Check the spec is internally consistent.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.input_length == 0 {
            return Err(ClassifierError::InvalidSpec(
                "input length must be positive".to_string(),
            ));
        }
        if self.num_classes == 0 {
            return Err(ClassifierError::InvalidSpec(
                "at least one class is required".to_string(),
            ));
        }
        if self.class_labels.len() != self.num_classes {
            return Err(ClassifierError::InvalidSpec(format!(
                "{} labels declared for {} classes",
                self.class_labels.len(),
                self.num_classes
            )));
        }
        Ok(())
    }

    /// Label at class index `index`.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.class_labels.get(index).map(String::as_str)
    }

    /// True if `label` is one of the classes.
    pub fn has_label(&self, label: &str) -> bool {
        self.class_labels.iter().any(|l| l == label)
    }
}

/// An inference engine: (N, 3) window in, probability vector out.
///
/// Implementations must not keep references to the window.
pub trait Classifier: Send {
    fn classify(&mut self, window: &WindowSnapshot) -> Result<Vec<f32>, ClassifierError>;
}

impl<F> Classifier for F
where
    F: FnMut(&WindowSnapshot) -> Vec<f32> + Send,
{
    fn classify(&mut self, window: &WindowSnapshot) -> Result<Vec<f32>, ClassifierError> {
        Ok(self(window))
    }
}

/// Index of the largest value; ties go to the lowest index.
///
/// NaN entries are never selected. Returns `None` for an empty or all-NaN
/// vector.
pub fn argmax(probabilities: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &p) in probabilities.iter().enumerate() {
        if p.is_nan() {
            continue;
        }
        match best {
            Some((_, max)) if p <= max => {}
            _ => best = Some((index, p)),
        }
    }
    best.map(|(index, _)| index)
}

/// The winning class of one classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
}

/// One engine bound to its spec.
pub struct ClassifierPort {
    name: &'static str,
    spec: ClassifierSpec,
    engine: Box<dyn Classifier>,
}

impl ClassifierPort {
    /// Wrap an engine, rejecting an invalid spec.
    pub fn new(
        name: &'static str,
        spec: ClassifierSpec,
        engine: Box<dyn Classifier>,
    ) -> Result<Self, ClassifierError> {
        spec.validate()?;
        Ok(Self { name, spec, engine })
    }

    /// Stage name used in logs and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Input and output shape of the engine.
    pub fn spec(&self) -> &ClassifierSpec {
        &self.spec
    }

    /// Run the engine and check the shape of what it returns.
    pub fn classify(&mut self, window: &WindowSnapshot) -> Result<Vec<f32>, ClassifierError> {
        if window.len() != self.spec.input_length {
            return Err(ClassifierError::InputShape {
                classifier: self.name,
                expected: self.spec.input_length,
                actual: window.len(),
            });
        }

        let output = self.engine.classify(window)?;
        if output.len() != self.spec.num_classes {
            return Err(ClassifierError::OutputShape {
                classifier: self.name,
                expected: self.spec.num_classes,
                actual: output.len(),
            });
        }
        Ok(output)
    }

    /// Classify and resolve the winning label.
    pub fn decide(&mut self, window: &WindowSnapshot) -> Result<Decision, ClassifierError> {
        let probabilities = self.classify(window)?;
        let index = argmax(&probabilities).ok_or(ClassifierError::NoDecision {
            classifier: self.name,
        })?;
        let label = self
            .spec
            .label(index)
            .ok_or(ClassifierError::NoDecision {
                classifier: self.name,
            })?
            .to_string();

        Ok(Decision {
            index,
            label,
            confidence: probabilities[index],
        })
    }
}

impl std::fmt::Debug for ClassifierPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierPort")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Classifier failures. All of them mean the models and windows disagree and
/// are fatal to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierError {
    InvalidSpec(String),
    InputShape {
        classifier: &'static str,
        expected: usize,
        actual: usize,
    },
    OutputShape {
        classifier: &'static str,
        expected: usize,
        actual: usize,
    },
    NoDecision {
        classifier: &'static str,
    },
    Engine(String),
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::InvalidSpec(e) => write!(f, "Invalid classifier spec: {e}"),
            ClassifierError::InputShape {
                classifier,
                expected,
                actual,
            } => write!(
                f,
                "{classifier} classifier expects {expected} samples, got {actual}"
            ),
            ClassifierError::OutputShape {
                classifier,
                expected,
                actual,
            } => write!(
                f,
                "{classifier} classifier returned {actual} outputs, expected {expected}"
            ),
            ClassifierError::NoDecision { classifier } => {
                write!(f, "{classifier} classifier returned no usable probabilities")
            }
            ClassifierError::Engine(e) => write!(f, "Inference engine error: {e}"),
        }
    }
}

impl std::error::Error for ClassifierError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::windowing::{SlidingWindow, WindowPurpose};
    use crate::source::types::Sample;

    fn full_window(len: usize) -> WindowSnapshot {
        let mut window = SlidingWindow::new(WindowPurpose::Activity, len);
        let mut last = None;
        for i in 0..len as u64 {
            last = window.push(Sample::primary(0.0, 0.0, 1.0, i)).ready();
        }
        last.unwrap()
    }

    #[test]
    fn test_argmax_picks_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.05, 0.05, 0.9]), Some(2));
    }

    #[test]
    fn test_argmax_ties_break_low() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), Some(0));
        assert_eq!(argmax(&[0.1, 0.45, 0.45]), Some(1));
    }

    #[test]
    fn test_argmax_edge_cases() {
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN, f32::NAN]), None);
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some(1));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
    }

    #[test]
    fn test_spec_validation() {
        let spec = ClassifierSpec::new(50, vec!["a".into(), "b".into()]);
        assert!(spec.validate().is_ok());
        assert_eq!(spec.num_classes, 2);

        let bad = ClassifierSpec {
            input_length: 50,
            num_classes: 3,
            class_labels: vec!["a".into()],
        };
        assert!(bad.validate().is_err());

        assert!(ClassifierSpec::new(0, vec!["a".into()]).validate().is_err());
    }

    #[test]
    fn test_port_decides_label() {
        let spec = ClassifierSpec::new(4, vec!["low".into(), "high".into()]);
        let engine = |_: &WindowSnapshot| vec![0.2, 0.8];
        let mut port = ClassifierPort::new("test", spec, Box::new(engine)).unwrap();

        let decision = port.decide(&full_window(4)).unwrap();
        assert_eq!(decision.index, 1);
        assert_eq!(decision.label, "high");
        assert!((decision.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_port_rejects_wrong_window_length() {
        let spec = ClassifierSpec::new(4, vec!["a".into()]);
        let mut port = ClassifierPort::new("test", spec, Box::new(|_: &WindowSnapshot| vec![1.0])).unwrap();

        let err = port.classify(&full_window(3)).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::InputShape {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_port_rejects_wrong_output_length() {
        let spec = ClassifierSpec::new(2, vec!["a".into(), "b".into()]);
        let mut port =
            ClassifierPort::new("test", spec, Box::new(|_: &WindowSnapshot| vec![1.0, 0.0, 0.0]))
                .unwrap();

        let err = port.classify(&full_window(2)).unwrap_err();
        assert!(matches!(err, ClassifierError::OutputShape { actual: 3, .. }));
    }
}
