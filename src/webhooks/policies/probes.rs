//! Health probe validation.
//!
//! Every container must declare a liveness and a readiness probe.

use k8s_openapi::api::core::v1::Container;

use super::{DenyReason, ValidationContext, Verdict};
use crate::workload::declares_probes;

pub fn validate(_ctx: &ValidationContext<'_>, container: &Container) -> Verdict {
    if !declares_probes(container) {
        return Verdict::denied(
            DenyReason::ProbesNotSet,
            format!(
                "container {} must set livenessProbe and readinessProbe",
                container.name
            ),
        );
    }

    Verdict::allowed()
}
