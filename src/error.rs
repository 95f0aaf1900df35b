use crate::preprocess::PreprocessError;

/// Failures of a single prediction request.
///
/// Prediction is all-or-nothing: any of these means no result was produced.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClassifierError {
    /// The input is not something that can be read as an image.
    #[error("{0}")]
    InvalidInputKind(String),

    /// The input could not be decoded or has an unsupported geometry.
    #[error("{0}")]
    InvalidImage(String),

    /// No model was loaded at startup.
    #[error("Model not loaded")]
    ModelUnavailable,

    /// The model failed while scoring.
    #[error("{0}")]
    ModelInference(String),

    /// All workers are busy and the queue is full.
    #[error("Inference queue is full, retry later")]
    Overloaded,

    /// The engine no longer accepts or answers jobs.
    #[error("Inference engine stopped")]
    EngineStopped,
}

impl From<PreprocessError> for ClassifierError {
    fn from(e: PreprocessError) -> Self {
        match &e {
            PreprocessError::InvalidInputKind(_) => Self::InvalidInputKind(e.to_string()),
            _ => Self::InvalidImage(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_errors_map_to_taxonomy() {
        let err: ClassifierError = PreprocessError::InvalidInputKind("rank 5".into()).into();
        assert!(matches!(err, ClassifierError::InvalidInputKind(msg) if msg.contains("rank 5")));

        let err: ClassifierError = PreprocessError::UnsupportedChannels(2).into();
        assert_eq!(
            err,
            ClassifierError::InvalidImage(
                "unsupported channel count 2, expected 1, 3 or 4".to_string()
            )
        );
    }

    #[test]
    fn test_unavailable_message() {
        assert_eq!(ClassifierError::ModelUnavailable.to_string(), "Model not loaded");
    }
}
