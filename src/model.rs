//! Dense softmax models loaded from JSON.
//!
//! This is the engine the binary plugs into the classifier ports. A model
//! file carries its own shape and label table:
//!
//! ```json
//! {
//!   "input_length": 50,
//!   "labels": ["Dynamic", "Static"],
//!   "weights": [[...150 values...], [...150 values...]],
//!   "bias": [0.0, 0.0]
//! }
//! ```
//!
//! Weights are applied to the window flattened row-major (x0, y0, z0, x1, ...).

use crate::config::ModelPaths;
use crate::core::cascade::CascadeModels;
use crate::core::classifier::{Classifier, ClassifierError, ClassifierPort, ClassifierSpec};
use crate::core::pipeline::PipelineError;
use crate::core::windowing::WindowSnapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelFile {
    input_length: usize,
    labels: Vec<String>,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// One linear layer followed by softmax.
#[derive(Debug, Clone)]
pub struct LinearModel {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl LinearModel {
    /// Build a model, checking `weights` is `labels × (input_length · 3)`.
    pub fn new(
        spec: &ClassifierSpec,
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
    ) -> Result<Self, ModelError> {
        let features = spec.input_length * 3;
        if weights.len() != spec.num_classes || bias.len() != spec.num_classes {
            return Err(ModelError::Shape(format!(
                "{} weight rows and {} biases for {} classes",
                weights.len(),
                bias.len(),
                spec.num_classes
            )));
        }
        if let Some(row) = weights.iter().position(|r| r.len() != features) {
            return Err(ModelError::Shape(format!(
                "weight row {row} has {} values, expected {features}",
                weights[row].len()
            )));
        }
        Ok(Self { weights, bias })
    }

    /// Load a model file and return it with its spec.
    pub fn load(path: &Path) -> Result<(ClassifierSpec, Self), ModelError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelError::IoError(format!("{}: {e}", path.display())))?;
        let file: ModelFile = serde_json::from_str(&content)
            .map_err(|e| ModelError::ParseError(format!("{}: {e}", path.display())))?;

        let spec = ClassifierSpec::new(file.input_length, file.labels);
        spec.validate()
            .map_err(|e| ModelError::Shape(e.to_string()))?;
        let model = Self::new(&spec, file.weights, file.bias)?;
        Ok((spec, model))
    }

    fn logits(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| b + row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>())
            .collect()
    }
}

impl Classifier for LinearModel {
    fn classify(&mut self, window: &WindowSnapshot) -> Result<Vec<f32>, ClassifierError> {
        let input = window.to_row_major();
        Ok(softmax(&self.logits(&input)))
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Load a model file into a classifier port.
pub fn load_port(name: &'static str, path: &Path) -> Result<ClassifierPort, PipelineError> {
    let (spec, model) = LinearModel::load(path)?;
    info!(
        classifier = name,
        input_length = spec.input_length,
        classes = spec.num_classes,
        "loaded model"
    );
    Ok(ClassifierPort::new(name, spec, Box::new(model))?)
}

/// Load and cross-check all five cascade models.
pub fn load_cascade(paths: &ModelPaths) -> Result<CascadeModels, PipelineError> {
    CascadeModels::new(
        load_port("branch", &paths.branch)?,
        load_port("static", &paths.static_activity)?,
        load_port("dynamic", &paths.dynamic_activity)?,
        load_port("secondary_aux", &paths.secondary_aux)?,
        load_port("respiratory", &paths.respiratory)?,
    )
}

/// Model loading errors. All of them abort startup.
#[derive(Debug)]
pub enum ModelError {
    IoError(String),
    ParseError(String),
    Shape(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::IoError(e) => write!(f, "IO error: {e}"),
            ModelError::ParseError(e) => write!(f, "Parse error: {e}"),
            ModelError::Shape(e) => write!(f, "Shape mismatch: {e}"),
        }
    }
}

impl std::error::Error for ModelError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::windowing::{SlidingWindow, WindowPurpose};
    use crate::source::types::Sample;
    use uuid::Uuid;

    fn window(samples: &[[f32; 3]]) -> WindowSnapshot {
        let mut window = SlidingWindow::new(WindowPurpose::Activity, samples.len());
        let mut last = None;
        for (i, [x, y, z]) in samples.iter().enumerate() {
            last = window.push(Sample::primary(*x, *y, *z, i as u64)).ready();
        }
        last.unwrap()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_linear_model_prefers_weighted_axis() {
        let spec = ClassifierSpec::new(1, vec!["x".into(), "z".into()]);
        let mut model = LinearModel::new(
            &spec,
            vec![vec![5.0, 0.0, 0.0], vec![0.0, 0.0, 5.0]],
            vec![0.0, 0.0],
        )
        .unwrap();

        let probs = model.classify(&window(&[[0.0, 0.0, 1.0]])).unwrap();
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_shape_checked_on_construction() {
        let spec = ClassifierSpec::new(2, vec!["a".into()]);
        let err = LinearModel::new(&spec, vec![vec![0.0; 5]], vec![0.0]).unwrap_err();
        assert!(matches!(err, ModelError::Shape(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir()
            .join("wearable-activity-agent-test")
            .join(format!("model-{}.json", Uuid::new_v4()));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let zeros = vec![0.0f32; 6];
        let body = serde_json::json!({
            "input_length": 2,
            "labels": ["Sitting", "Standing"],
            "weights": [zeros.clone(), zeros],
            "bias": [0.0, 1.0]
        });
        std::fs::write(&path, body.to_string()).unwrap();

        let mut port = load_port("secondary_aux", &path).unwrap();
        assert_eq!(port.spec().input_length, 2);
        let decision = port.decide(&window(&[[0.0; 3], [0.0; 3]])).unwrap();
        assert_eq!(decision.label, "Standing");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = load_port("branch", Path::new("/nonexistent/branch.json"));
        assert!(matches!(result, Err(PipelineError::Model(ModelError::IoError(_)))));
    }
}
