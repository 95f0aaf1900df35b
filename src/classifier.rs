use crate::{
    engine::{EngineConfig, InferenceEngine},
    error::ClassifierError,
    model::ClassifierModel,
    prediction::PredictionResult,
    preprocess::ImageInput,
};

/// Entry point for prediction requests.
///
/// Holds the inference engine when a model was loaded at startup, and nothing otherwise.
/// Requests made without a model fail with [`ClassifierError::ModelUnavailable`] before
/// any decoding.
pub struct Classifier<M: ClassifierModel> {
    engine: Option<InferenceEngine<M>>,
}

impl<M: ClassifierModel> Classifier<M> {
    pub fn new(model: Option<M>, config: EngineConfig) -> Self {
        Self {
            engine: model.map(|model| InferenceEngine::new(model, config)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    /// Classifies an uploaded encoded image.
    pub async fn predict(&self, bytes: Vec<u8>) -> Result<PredictionResult, ClassifierError> {
        self.classify(ImageInput::Bytes(bytes)).await
    }

    /// Classifies an image given in any supported form.
    pub async fn classify(&self, input: ImageInput) -> Result<PredictionResult, ClassifierError> {
        let engine = self
            .engine
            .as_ref()
            .ok_or(ClassifierError::ModelUnavailable)?;

        match engine.submit(input).await {
            Ok(outcome) => {
                let prediction = outcome.prediction;
                log::info!(
                    "prediction={} prob={:.3}",
                    prediction.label,
                    prediction.confidence
                );
                log::debug!(
                    "inference {} took {:.2}ms",
                    outcome.id,
                    outcome.duration.as_secs_f64() * 1000.0
                );
                Ok(prediction)
            }
            Err(e) => {
                match &e {
                    ClassifierError::ModelInference(detail) => {
                        log::error!("Prediction failed in model: {detail}")
                    }
                    other => log::warn!("Prediction failed: {other}"),
                }
                Err(e)
            }
        }
    }
}
