//! Cats vs dogs image classification served over HTTP.
//!
//! An uploaded image is decoded and normalized into a `(1, 224, 224, 3)` tensor,
//! scored by a [`ClassifierModel`] on the worker pool of an [`InferenceEngine`], and
//! shaped into a [`PredictionResult`]. The [`server`] module exposes this through axum.

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod messages;
pub mod metrics;
pub mod model;
pub mod prediction;
pub mod preprocess;
pub mod server;

pub use classifier::Classifier;
pub use engine::{EngineConfig, InferenceEngine, InferenceOutcome};
pub use error::ClassifierError;
pub use model::{ClassifierModel, ModelError, OnnxModel};
pub use prediction::{Class, PredictionResult, Probabilities, ProbabilityVector};
pub use preprocess::{ImageInput, NormalizedTensor, PixelScale, normalize};
