//! Container security context validation.
//!
//! Applies to Deployments only. Every container must explicitly disable both
//! privileged mode and privilege escalation.

use k8s_openapi::api::core::v1::Container;

use super::{DenyReason, ValidationContext, Verdict};
use crate::workload::has_restricted_security_context;

pub fn validate(_ctx: &ValidationContext<'_>, container: &Container) -> Verdict {
    if !has_restricted_security_context(container) {
        return Verdict::denied(
            DenyReason::SecurityContextNotRestricted,
            format!(
                "container {} must set securityContext.allowPrivilegeEscalation and securityContext.privileged to false",
                container.name
            ),
        );
    }

    Verdict::allowed()
}
