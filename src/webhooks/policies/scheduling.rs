//! Scheduling policy validation.
//!
//! Deployments must pin placement with both a node selector and an affinity.
//! Pods only need one of the two. The two kinds deliberately differ.

use super::{DenyReason, ValidationContext, Verdict};

/// Deny a Deployment unless both `nodeSelector` and `affinity` are set
pub fn validate_deployment(ctx: &ValidationContext<'_>) -> Verdict {
    let workload = ctx.workload;
    if workload.node_selector().is_none() || workload.affinity().is_none() {
        return Verdict::denied(
            DenyReason::NoSchedulingPolicy,
            format!(
                "deployment {} must set both nodeSelector and affinity",
                workload.name()
            ),
        );
    }

    Verdict::allowed()
}

/// Deny a Pod only when neither `nodeSelector` nor `affinity` is set
pub fn validate_pod(ctx: &ValidationContext<'_>) -> Verdict {
    let workload = ctx.workload;
    if workload.node_selector().is_none() && workload.affinity().is_none() {
        return Verdict::denied(
            DenyReason::NoSchedulingPolicy,
            format!(
                "pod {} must set a nodeSelector or an affinity",
                workload.name()
            ),
        );
    }

    Verdict::allowed()
}
