use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use crate::prediction::PredictionResult as PredictionResponse;

/// Name of the multipart field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub endpoints: BTreeMap<String, String>,
}
