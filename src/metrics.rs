use std::{sync::Arc, time::Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub const REQUEST_COUNT_FAMILY: &str = "cats_dogs_api_requests_total";
pub const REQUEST_LATENCY_FAMILY: &str = "cats_dogs_api_request_latency_seconds";

/// Endpoint label of requests that matched no route.
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

pub const DEFAULT_HISTOGRAM_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Request counter and latency histogram for the HTTP API.
pub struct ApiMetrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(REQUEST_COUNT_FAMILY, "Total API requests"),
            &["method", "endpoint", "http_status"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new(REQUEST_LATENCY_FAMILY, "Request latency (s)")
                .buckets(DEFAULT_HISTOGRAM_BUCKETS.to_vec()),
            &["endpoint"],
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            registry,
            requests,
            latency,
        })
    }

    pub fn observe(&self, method: &str, endpoint: &str, status: u16, seconds: f64) {
        self.requests
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.latency.with_label_values(&[endpoint]).observe(seconds);
    }

    /// Renders all families in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn request_count(&self, method: &str, endpoint: &str, status: u16) -> u64 {
        self.requests
            .with_label_values(&[method, endpoint, &status.to_string()])
            .get()
    }
}

/// Middleware counting and timing every request, and logging one line per request.
///
/// Requests are labelled by their route template, so unknown paths share one series.
pub async fn track_metrics(
    State(metrics): State<Arc<ApiMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ENDPOINT, |p| p.as_str())
        .to_owned();

    let response = next.run(req).await;

    let duration = start_time.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    metrics.observe(&method, &endpoint, status, duration);
    log::info!(
        "{method} {path} status={status} duration_ms={:.2}",
        duration * 1000.0
    );

    response
}
