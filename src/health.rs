//! Health endpoints and Prometheus metrics.
//!
//! Provides:
//! - `/health` - Plain-text liveness message
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the listener is serving)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;

/// Labels for admission decisions
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DecisionLabels {
    pub endpoint: String,
    pub kind: String,
    pub outcome: String,
}

impl EncodeLabelSet for DecisionLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("endpoint", self.endpoint.as_str()).encode(encoder.encode_label())?;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for requests rejected before a decision
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ErrorLabels {
    pub endpoint: String,
    pub error: String,
}

impl EncodeLabelSet for ErrorLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("endpoint", self.endpoint.as_str()).encode(encoder.encode_label())?;
        ("error", self.error.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels keyed by endpoint only
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct EndpointLabels {
    pub endpoint: String,
}

impl EncodeLabelSet for EndpointLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("endpoint", self.endpoint.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the webhook
pub struct Metrics {
    /// Admission decisions by endpoint, kind and outcome
    pub admission_requests_total: Family<DecisionLabels, Counter>,
    /// Requests that failed before a decision
    pub admission_errors_total: Family<ErrorLabels, Counter>,
    /// Request handling duration histogram
    pub admission_duration_seconds: Family<EndpointLabels, Histogram>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "admission_requests",
            "Total number of admission decisions",
            admission_requests_total.clone(),
        );

        let admission_errors_total = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "admission_errors",
            "Total number of admission requests rejected before a decision",
            admission_errors_total.clone(),
        );

        let admission_duration_seconds =
            Family::<EndpointLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.0001, 2.0, 15))
            });
        registry.register(
            "admission_duration_seconds",
            "Duration of admission request handling in seconds",
            admission_duration_seconds.clone(),
        );

        Self {
            admission_requests_total,
            admission_errors_total,
            admission_duration_seconds,
            registry,
        }
    }

    /// Record an admission decision
    pub fn record_decision(&self, endpoint: &str, kind: &str, outcome: &str, duration_secs: f64) {
        let labels = DecisionLabels {
            endpoint: endpoint.to_string(),
            kind: kind.to_string(),
            outcome: outcome.to_string(),
        };
        self.admission_requests_total.get_or_create(&labels).inc();
        self.admission_duration_seconds
            .get_or_create(&EndpointLabels {
                endpoint: endpoint.to_string(),
            })
            .observe(duration_secs);
    }

    /// Record a request rejected before a decision
    pub fn record_error(&self, endpoint: &str, error: &str) {
        let labels = ErrorLabels {
            endpoint: endpoint.to_string(),
            error: error.to_string(),
        };
        self.admission_errors_total.get_or_create(&labels).inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health endpoints
pub struct HealthState {
    /// Whether the webhook is serving
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the webhook as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the webhook is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "Health Check is OK...\n")
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK once serving, 503 Service Unavailable otherwise.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
