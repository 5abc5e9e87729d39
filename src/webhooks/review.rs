//! AdmissionReview request decoding.
//!
//! Turns a raw request body into kube's [`AdmissionRequest`] plus a typed
//! [`Workload`]. Every failure here is a client error and is reported as an
//! HTTP error, never as a policy denial.

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview, ConvertAdmissionReviewError};
use kube::core::dynamic::ParseDynamicObjectError;

use crate::workload::{Workload, WorkloadKind};

/// The only media type accepted on admission endpoints
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors decoding an admission request
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Content type is not exactly `application/json`
    #[error("Content-Type={0}, expect application/json")]
    UnsupportedMediaType(String),

    /// The AdmissionReview envelope is malformed or carries no request
    #[error("failed to decode AdmissionReview request: {0}")]
    Envelope(String),

    /// The embedded object does not decode as its declared kind
    #[error("failed to decode {kind} object: {source}")]
    Object {
        kind: WorkloadKind,
        #[source]
        source: ParseDynamicObjectError,
    },

    /// A Deployment or Pod request carries no object
    #[error("{0} request has no object")]
    MissingObject(WorkloadKind),
}

/// A fully decoded admission request
#[derive(Debug, Clone)]
pub struct DecodedReview {
    /// The request with its object moved into `workload`. Carries the
    /// review's type metadata for the response.
    pub request: AdmissionRequest<DynamicObject>,
    pub kind: WorkloadKind,
    /// `None` when the kind is outside the policy scope
    pub workload: Option<Workload>,
}

impl DecodedReview {
    pub fn uid(&self) -> &str {
        &self.request.uid
    }

    /// Request namespace, empty for cluster-scoped requests
    pub fn namespace(&self) -> &str {
        self.request.namespace.as_deref().unwrap_or_default()
    }
}

/// Reject anything but an exact JSON content type
pub fn check_content_type(content_type: Option<&str>) -> Result<(), DecodeError> {
    match content_type {
        Some(JSON_CONTENT_TYPE) => Ok(()),
        other => Err(DecodeError::UnsupportedMediaType(
            other.unwrap_or_default().to_string(),
        )),
    }
}

/// Decode a request body into the admission request and a typed workload.
///
/// The content type is checked before the body is touched.
pub fn decode_review(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<DecodedReview, DecodeError> {
    check_content_type(content_type)?;

    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(|e| DecodeError::Envelope(e.to_string()))?;
    let mut request: AdmissionRequest<DynamicObject> = review
        .try_into()
        .map_err(|e: ConvertAdmissionReviewError| DecodeError::Envelope(e.to_string()))?;

    let kind = WorkloadKind::from_kind(&request.kind.kind);
    let workload = match kind {
        WorkloadKind::Other(_) => None,
        _ => {
            let object = request
                .object
                .take()
                .ok_or_else(|| DecodeError::MissingObject(kind.clone()))?;
            match Workload::from_object(&kind, object) {
                Some(Ok(workload)) => Some(workload),
                Some(Err(source)) => return Err(DecodeError::Object { kind, source }),
                None => None,
            }
        }
    };

    Ok(DecodedReview {
        request,
        kind,
        workload,
    })
}
