use std::path::{Path, PathBuf};

use tract_onnx::prelude::*;

use crate::prediction::{ProbabilityError, ProbabilityVector};
use crate::preprocess::{NormalizedTensor, TENSOR_SHAPE};

/// Conventional artifact locations, checked in order at startup.
pub const DEFAULT_MODEL_PATHS: [&str; 2] = ["models/model.onnx", "models/cats_dogs.onnx"];

/// Trait for models that score a normalized image.
///
/// Implementations are shared by every worker of the
/// [`InferenceEngine`](crate::InferenceEngine), so `predict` takes `&self` and must be
/// safe to call concurrently. A model whose runtime is not reentrant has to serialize
/// internally.
pub trait ClassifierModel: Send + Sync + 'static {
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Scores one `(1, 224, 224, 3)` tensor and returns the class probabilities.
    fn predict(&self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to load model from {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("model runtime failure: {0}")]
    Runtime(String),

    #[error("input tensor is not contiguous")]
    NonContiguousInput,

    #[error("unexpected model output: {0}")]
    Output(#[from] ProbabilityError),
}

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// ONNX classifier evaluated with tract.
pub struct OnnxModel {
    plan: Plan,
}

impl OnnxModel {
    /// Loads and optimizes the model at `path` for a fixed `[1, 224, 224, 3]` input.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref().to_path_buf();
        let load_err = |e: TractError| ModelError::Load {
            path: path.clone(),
            message: format!("{e:#}"),
        };

        let plan = tract_onnx::onnx()
            .model_for_path(&path)
            .and_then(|model| model.with_input_fact(0, f32::fact(TENSOR_SHAPE).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(load_err)?;

        Ok(Self { plan })
    }
}

impl ClassifierModel for OnnxModel {
    type Error = ModelError;

    fn predict(&self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, Self::Error> {
        let data = tensor.as_slice().ok_or(ModelError::NonContiguousInput)?;
        let input = Tensor::from_shape(tensor.shape(), data)
            .map_err(|e| ModelError::Runtime(format!("{e:#}")))?;

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| ModelError::Runtime(format!("{e:#}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| ModelError::Runtime("model produced no outputs".to_string()))?;
        let scores = output
            .as_slice::<f32>()
            .map_err(|e| ModelError::Runtime(format!("{e:#}")))?;

        Ok(ProbabilityVector::from_slice(scores)?)
    }
}

/// Returns the first of `candidates` that exists on disk.
pub fn discover_model_path<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|p| p.as_ref())
        .find(|p| p.is_file())
        .map(Path::to_path_buf)
}

/// Loads the model once at startup.
///
/// Uses `explicit` when given, otherwise the first of [`DEFAULT_MODEL_PATHS`] that exists.
/// A missing or broken artifact is logged and leaves the service without a model.
pub fn load_at_startup(explicit: Option<&Path>) -> Option<OnnxModel> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match discover_model_path(&DEFAULT_MODEL_PATHS) {
            Some(path) => path,
            None => {
                log::warn!(
                    "No model file found at {}",
                    DEFAULT_MODEL_PATHS.join(" or ")
                );
                return None;
            }
        },
    };

    match OnnxModel::load(&path) {
        Ok(model) => {
            log::info!("Model loaded from {}", path.display());
            Some(model)
        }
        Err(e) => {
            log::error!("Failed to load model: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_prefers_first_existing() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("model.onnx");
        let second = dir.path().join("cats_dogs.onnx");

        assert_eq!(discover_model_path(&[&first, &second]), None);

        std::fs::write(&second, b"onnx").unwrap();
        assert_eq!(discover_model_path(&[&first, &second]), Some(second.clone()));

        std::fs::write(&first, b"onnx").unwrap();
        assert_eq!(discover_model_path(&[&first, &second]), Some(first));
    }

    #[test]
    fn test_discover_ignores_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover_model_path(&[dir.path()]), None);
    }

    #[test]
    fn test_broken_artifact_leaves_service_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"not a protobuf").unwrap();

        assert!(matches!(OnnxModel::load(&path), Err(ModelError::Load { .. })));
        assert!(load_at_startup(Some(&path)).is_none());
    }

    #[test]
    fn test_missing_explicit_path() {
        assert!(load_at_startup(Some(Path::new("/nonexistent/model.onnx"))).is_none());
    }
}
