//! Admission webhook server.
//!
//! Serves `/validate` and `/mutate` for the API server together with the
//! health and metrics routes on a single listener. TLS is used when a
//! certificate directory is configured, plain HTTP otherwise.
//!
//! Decode and encode failures are answered with an HTTP error status. Policy
//! denials and mutation failures are answered with a well-formed
//! AdmissionReview.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use kube::core::admission::AdmissionResponse;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::health::{self, HealthState};
use crate::webhooks::mutation;
use crate::webhooks::policies::{ValidationContext, validate_all};
use crate::webhooks::response::{self, encode_review, is_patch_failure};
use crate::webhooks::review::{DecodeError, DecodedReview, JSON_CONTENT_TYPE, decode_review};
use crate::workload::Workload;

pub const VALIDATE_PATH: &str = "/validate";
pub const MUTATE_PATH: &str = "/mutate";

const VALIDATE_ENDPOINT: &str = "validate";
const MUTATE_ENDPOINT: &str = "mutate";

/// Errors that can occur while serving admission requests
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The response envelope could not be serialized
    #[error("failed to encode AdmissionReview response: {0}")]
    Encode(#[source] serde_json::Error),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Listener error
    #[error("webhook server error: {0}")]
    Server(#[from] std::io::Error),
}

impl WebhookError {
    /// Label used for the `admission_errors` metric
    pub fn metric_label(&self) -> &'static str {
        match self {
            WebhookError::Decode(DecodeError::UnsupportedMediaType(_)) => "unsupported_media_type",
            WebhookError::Decode(DecodeError::Envelope(_)) => "envelope",
            WebhookError::Decode(DecodeError::Object { .. } | DecodeError::MissingObject(_)) => {
                "object"
            }
            WebhookError::Encode(_) => "encode",
            WebhookError::TlsConfig(_) | WebhookError::Server(_) => "server",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebhookError::Decode(DecodeError::UnsupportedMediaType(_)) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string())
            }
            WebhookError::Decode(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            // Never leak a partially built envelope
            WebhookError::Encode(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to encode AdmissionReview response".to_string(),
            ),
            WebhookError::TlsConfig(_) | WebhookError::Server(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

/// Shared state for webhook handlers
pub struct WebhookState {
    pub health: Arc<HealthState>,
}

impl WebhookState {
    pub fn new(health: Arc<HealthState>) -> Self {
        Self { health }
    }
}

/// Create the admission router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(VALIDATE_PATH, post(validate_handler))
        .route(MUTATE_PATH, post(mutate_handler))
        .with_state(state)
}

/// Create the full router: admission endpoints plus health and metrics
pub fn create_router(health: Arc<HealthState>) -> Router {
    let state = Arc::new(WebhookState::new(health.clone()));
    create_webhook_router(state).merge(health::create_router(health))
}

async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(&state, VALIDATE_ENDPOINT, &headers, &body, validate_review)
}

async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(&state, MUTATE_ENDPOINT, &headers, &body, mutate_review)
}

/// Decode, decide and encode one admission request
fn handle(
    state: &WebhookState,
    endpoint: &'static str,
    headers: &HeaderMap,
    body: &[u8],
    decide: fn(&DecodedReview) -> AdmissionResponse,
) -> Response {
    let started = Instant::now();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let result = decode_review(content_type, body)
        .map_err(WebhookError::from)
        .and_then(|review| {
            let response = decide(&review);
            let label = outcome(&response);
            let bytes = encode_review(response).map_err(WebhookError::Encode)?;
            state.health.metrics.record_decision(
                endpoint,
                review.kind.metric_label(),
                label,
                started.elapsed().as_secs_f64(),
            );
            Ok(bytes)
        });

    match result {
        Ok(bytes) => ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response(),
        Err(e) => {
            error!(endpoint, error = %e, "Failed to process admission request");
            state.health.metrics.record_error(endpoint, e.metric_label());
            e.into_response()
        }
    }
}

/// Run the validation policies for a decoded request
pub fn validate_review(review: &DecodedReview) -> AdmissionResponse {
    let request = &review.request;
    debug!(
        uid = %request.uid,
        kind = %review.kind,
        namespace = %review.namespace(),
        operation = ?request.operation,
        "Processing validation request"
    );

    let Some(workload) = &review.workload else {
        debug!(uid = %request.uid, kind = %review.kind, "Kind not subject to policy, allowing");
        return AdmissionResponse::from(request);
    };

    let ctx = ValidationContext {
        workload,
        namespace: review.namespace(),
    };
    let verdict = validate_all(&ctx);

    if verdict.allowed {
        info!(uid = %request.uid, kind = %workload.kind(), name = %workload.name(), "Admission request allowed");
    } else {
        warn!(
            uid = %request.uid,
            kind = %workload.kind(),
            name = %workload.name(),
            reason = ?verdict.reason,
            message = ?verdict.message,
            "Admission request denied"
        );
    }

    response::from_verdict(request, &verdict)
}

/// Compute the security-context patch for a decoded request
pub fn mutate_review(review: &DecodedReview) -> AdmissionResponse {
    let request = &review.request;
    debug!(
        uid = %request.uid,
        kind = %review.kind,
        namespace = %review.namespace(),
        "Processing mutation request"
    );

    let Some(Workload::Deployment(deployment)) = &review.workload else {
        debug!(uid = %request.uid, kind = %review.kind, "Kind not subject to mutation, allowing unchanged");
        return AdmissionResponse::from(request);
    };
    let name = deployment.metadata.name.as_deref().unwrap_or_default();

    let Some(patch) = mutation::build_patch(deployment) else {
        debug!(uid = %request.uid, deployment = %name, "Security context already restricted");
        return AdmissionResponse::from(request);
    };

    let patch_ops = patch.0.len();
    let response = response::with_patch(request, patch);
    if is_patch_failure(&response) {
        error!(
            uid = %request.uid,
            deployment = %name,
            error = %response.result.message,
            "Failed to serialize patch"
        );
    } else {
        info!(uid = %request.uid, deployment = %name, patch_ops, "Applying security context patch");
    }
    response
}

/// Metric outcome label for a response
fn outcome(response: &AdmissionResponse) -> &'static str {
    match (response.allowed, response.patch.is_some()) {
        (true, true) => "mutated",
        (true, false) => "allowed",
        (false, _) if is_patch_failure(response) => "mutation_failed",
        (false, _) => "denied",
    }
}

/// Run the webhook server until the listener fails.
///
/// Binds to `0.0.0.0:<port>`. With a certificate directory configured the
/// listener uses TLS from `tls.crt`/`tls.key` (PEM). Readiness is set once
/// the listener is up.
pub async fn run_webhook_server(
    config: &Config,
    health: Arc<HealthState>,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;

    let app = create_router(health.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

            info!(port = config.port, "Webhook server listening with TLS");
            health.set_ready(true).await;
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;

            info!(port = config.port, "Webhook server listening without TLS");
            health.set_ready(true).await;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
