//! HTTP surface of the classifier.
//!
//! - `POST /predict`: multipart upload with the image in the `file` field
//! - `GET /health`: liveness and whether a model is loaded
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /`: static service descriptor

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::{
    classifier::Classifier,
    error::ClassifierError,
    messages::{ErrorResponse, HealthResponse, ServiceDescriptor, UPLOAD_FIELD},
    metrics::{self, ApiMetrics},
    model::ClassifierModel,
    prediction::PredictionResult,
};

pub const SERVICE_NAME: &str = "Cats vs Dogs Prediction API";

/// Shared state of all request handlers.
pub struct AppState<M: ClassifierModel> {
    pub classifier: Classifier<M>,
    pub metrics: Arc<ApiMetrics>,
}

impl<M: ClassifierModel> AppState<M> {
    pub fn new(classifier: Classifier<M>, metrics: Arc<ApiMetrics>) -> Self {
        Self {
            classifier,
            metrics,
        }
    }
}

/// Error returned by the handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Classifier(ClassifierError),
    BadUpload { status: StatusCode, message: String },
    Internal(String),
}

impl From<ClassifierError> for ApiError {
    fn from(e: ClassifierError) -> Self {
        Self::Classifier(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::BadUpload {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        Self::BadUpload {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Classifier(e) => match e {
                ClassifierError::InvalidInputKind(_)
                | ClassifierError::InvalidImage(_)
                | ClassifierError::ModelInference(_) => StatusCode::BAD_REQUEST,
                ClassifierError::ModelUnavailable | ClassifierError::EngineStopped => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                ClassifierError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::BadUpload { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::Classifier(e) => e.to_string(),
            ApiError::BadUpload { message, .. } | ApiError::Internal(message) => message,
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Builds the router with all endpoints and the metrics middleware.
pub fn router<M: ClassifierModel>(state: Arc<AppState<M>>, max_upload_bytes: usize) -> Router {
    let api_metrics = state.metrics.clone();
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::<M>))
        .route("/metrics", get(render_metrics::<M>))
        .route("/predict", post(predict::<M>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(
            api_metrics,
            metrics::track_metrics,
        ))
        .with_state(state)
}

async fn root() -> Json<ServiceDescriptor> {
    let endpoints = [
        ("/health", "GET"),
        ("/predict", "POST (multipart image)"),
        ("/metrics", "GET"),
    ]
    .into_iter()
    .map(|(path, method)| (path.to_string(), method.to_string()))
    .collect::<BTreeMap<_, _>>();

    Json(ServiceDescriptor {
        service: SERVICE_NAME.to_string(),
        endpoints,
    })
}

async fn health<M: ClassifierModel>(
    State(state): State<Arc<AppState<M>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.classifier.is_loaded(),
    })
}

async fn render_metrics<M: ClassifierModel>(
    State(state): State<Arc<AppState<M>>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

async fn predict<M: ClassifierModel>(
    State(state): State<Arc<AppState<M>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    if !state.classifier.is_loaded() {
        return Err(ClassifierError::ModelUnavailable.into());
    }
    let mut multipart = multipart?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            upload = Some(field.bytes().await?);
            break;
        }
    }
    let Some(bytes) = upload else {
        log::debug!("Upload without a `{UPLOAD_FIELD}` field");
        return Err(ApiError::BadUpload {
            status: StatusCode::BAD_REQUEST,
            message: format!("missing multipart field `{UPLOAD_FIELD}`"),
        });
    };

    let prediction = state.classifier.predict(bytes.to_vec()).await?;
    Ok(Json(prediction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ClassifierError::InvalidInputKind("x".into()), 400),
            (ClassifierError::InvalidImage("x".into()), 400),
            (ClassifierError::ModelInference("x".into()), 400),
            (ClassifierError::ModelUnavailable, 500),
            (ClassifierError::EngineStopped, 500),
            (ClassifierError::Overloaded, 503),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).status().as_u16(), code);
        }
        let too_large = ApiError::BadUpload {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "x".into(),
        };
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
