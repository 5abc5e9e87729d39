//! Admission webhooks for Deployments and Pods.
//!
//! - Validation: fail-fast policy chain per workload kind (`/validate`)
//! - Mutation: security-context defaults for Deployments (`/mutate`)
//!
//! Both endpoints share the request decoder and the response encoder.

pub mod mutation;
pub mod policies;
pub mod response;
pub mod review;
mod server;

pub use policies::{DenyReason, ValidationContext, Verdict};
pub use review::{DecodeError, DecodedReview, decode_review};
pub use server::{
    MUTATE_PATH, VALIDATE_PATH, WebhookError, WebhookState, create_router,
    create_webhook_router, mutate_review, run_webhook_server, validate_review,
};
