//! Pod naming convention validation.
//!
//! Namespaces are named `<project>-<env>`; Pods in them must be named
//! `<project>-...`. A namespace without a `-` yields an empty project, so the
//! required prefix is just `-`.

use super::{DenyReason, ValidationContext, Verdict};

/// Project identifier: the namespace up to its first `-`, or empty
pub fn project_identifier(namespace: &str) -> &str {
    namespace
        .split_once('-')
        .map(|(project, _)| project)
        .unwrap_or_default()
}

pub fn validate(ctx: &ValidationContext<'_>) -> Verdict {
    let prefix = format!("{}-", project_identifier(ctx.namespace));
    if !ctx.workload.name().starts_with(&prefix) {
        return Verdict::denied(
            DenyReason::NamingConventionViolated,
            format!("pod name must start with '{}'", prefix),
        );
    }

    Verdict::allowed()
}
