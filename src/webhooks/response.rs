//! AdmissionReview response building.
//!
//! Responses are kube [`AdmissionResponse`]s built from the request, so the
//! review's `apiVersion`/`kind` and the request `uid` are always echoed. The
//! `status` object is left empty unless it carries meaning: a denial, a
//! successful mutation or a failed mutation.

use std::error::Error as StdError;

use json_patch::Patch;
use kube::core::DynamicObject;
use kube::core::Status;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};

use crate::webhooks::policies::Verdict;

/// Reason attached when the patch could not be encoded
pub const PATCH_ENCODE_FAILED_REASON: &str = "PatchEncodeFailed";
/// Status code attached to a successful mutation
pub const MUTATION_SUCCESS_CODE: u16 = 200;
/// Status code attached to a failed mutation
pub const MUTATION_FAILURE_CODE: u16 = 500;

/// Response for a validation verdict
pub fn from_verdict(request: &AdmissionRequest<DynamicObject>, verdict: &Verdict) -> AdmissionResponse {
    if verdict.allowed {
        return AdmissionResponse::from(request);
    }

    let message = verdict.message.as_deref().unwrap_or_default();
    let reason = verdict.reason.map(|reason| reason.to_string()).unwrap_or_default();

    let mut response = AdmissionResponse::from(request).deny(message);
    response.result = Status::failure(message, &reason).with_code(verdict.code.unwrap_or_default());
    response
}

/// Allowed with an attached JSON patch, or a fail-closed denial when the
/// patch cannot be serialized
pub fn with_patch(request: &AdmissionRequest<DynamicObject>, patch: Patch) -> AdmissionResponse {
    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(mut response) => {
            response.result = Status::success().with_code(MUTATION_SUCCESS_CODE);
            response
        }
        Err(e) => patch_failure(request, &e),
    }
}

/// Fail-closed response when the patch could not be built
pub fn patch_failure(
    request: &AdmissionRequest<DynamicObject>,
    error: &(dyn StdError + 'static),
) -> AdmissionResponse {
    let message = match error.source() {
        Some(source) => format!("{error}: {source}"),
        None => error.to_string(),
    };

    let mut response = AdmissionResponse::from(request).deny(&message);
    response.result =
        Status::failure(&message, PATCH_ENCODE_FAILED_REASON).with_code(MUTATION_FAILURE_CODE);
    response
}

/// Whether the response is a fail-closed mutation failure
pub fn is_patch_failure(response: &AdmissionResponse) -> bool {
    !response.allowed && response.result.reason == PATCH_ENCODE_FAILED_REASON
}

/// Serialize a response as a full review in one piece; a failure yields no
/// bytes at all
pub fn encode_review(response: AdmissionResponse) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&response.into_review())
}
