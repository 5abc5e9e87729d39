//! Resource declaration validation.
//!
//! Every container must declare both limits and requests.

use k8s_openapi::api::core::v1::Container;

use super::{DenyReason, ValidationContext, Verdict};
use crate::workload::declares_resources;

pub fn validate(_ctx: &ValidationContext<'_>, container: &Container) -> Verdict {
    if !declares_resources(container) {
        return Verdict::denied(
            DenyReason::ResourceLimitsNotSet,
            format!(
                "container {} must set resources.limits and resources.requests",
                container.name
            ),
        );
    }

    Verdict::allowed()
}
