//! Validation policies for Deployment and Pod admission.
//!
//! Policies form an ordered chain per workload kind. The chain is fail-fast:
//! the first failing rule decides the verdict and nothing after it runs, so a
//! rejected request carries exactly one reason.
//!
//! Deployment chain: scheduling, then per container security context,
//! resources and probes.
//! Pod chain (every denial carries code 402): naming, scheduling, then per
//! container resources and probes.

pub mod naming;
pub mod probes;
pub mod resources;
pub mod scheduling;
pub mod security_context;

use k8s_openapi::api::core::v1::Container;

use crate::workload::{Workload, is_sidecar};

/// Status code attached to every Pod rule failure
pub const POD_DENIAL_CODE: u16 = 402;

/// Short code identifying which rule denied a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NamingConventionViolated,
    NoSchedulingPolicy,
    SecurityContextNotRestricted,
    ResourceLimitsNotSet,
    ProbesNotSet,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NamingConventionViolated => "naming convention violated",
            DenyReason::NoSchedulingPolicy => "no scheduling policy set",
            DenyReason::SecurityContextNotRestricted => "security context not restricted",
            DenyReason::ResourceLimitsNotSet => "resource limits not set",
            DenyReason::ProbesNotSet => "probes not set",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running the validation chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Rule that denied the request (if not allowed)
    pub reason: Option<DenyReason>,
    /// Detailed message (if not allowed)
    pub message: Option<String>,
    /// Explicit status code, only set by rules that carry one
    pub code: Option<u16>,
}

impl Verdict {
    /// Create an allowed verdict with no result payload
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
            code: None,
        }
    }

    /// Create a denied verdict
    pub fn denied(reason: DenyReason, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            message: Some(message.into()),
            code: None,
        }
    }

    /// Attach a status code to the verdict
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }
}

/// Context for validation
pub struct ValidationContext<'a> {
    /// The workload being validated
    pub workload: &'a Workload,
    /// Namespace of the admission request, empty when cluster scoped
    pub namespace: &'a str,
}

impl<'a> ValidationContext<'a> {
    /// Containers subject to container-level rules (the mesh sidecar is skipped)
    pub fn checked_containers(&self) -> impl Iterator<Item = &'a Container> {
        self.workload
            .containers()
            .iter()
            .filter(|container| !is_sidecar(container))
    }
}

/// Rule applied to one container at a time
type ContainerRule = fn(&ValidationContext<'_>, &Container) -> Verdict;

const DEPLOYMENT_CONTAINER_RULES: &[ContainerRule] = &[
    security_context::validate,
    resources::validate,
    probes::validate,
];

const POD_CONTAINER_RULES: &[ContainerRule] = &[resources::validate, probes::validate];

/// Run all validation policies for the workload
pub fn validate_all(ctx: &ValidationContext<'_>) -> Verdict {
    match ctx.workload {
        Workload::Deployment(_) => validate_deployment(ctx),
        Workload::Pod(_) => validate_pod(ctx),
    }
}

fn validate_deployment(ctx: &ValidationContext<'_>) -> Verdict {
    let result = scheduling::validate_deployment(ctx);
    if !result.allowed {
        return result;
    }

    run_container_rules(ctx, DEPLOYMENT_CONTAINER_RULES)
}

fn validate_pod(ctx: &ValidationContext<'_>) -> Verdict {
    let result = naming::validate(ctx);
    if !result.allowed {
        return result.with_code(POD_DENIAL_CODE);
    }

    let result = scheduling::validate_pod(ctx);
    if !result.allowed {
        return result.with_code(POD_DENIAL_CODE);
    }

    let result = run_container_rules(ctx, POD_CONTAINER_RULES);
    if !result.allowed {
        return result.with_code(POD_DENIAL_CODE);
    }

    Verdict::allowed()
}

/// Apply every rule to container 0, then every rule to container 1, and so on
fn run_container_rules(ctx: &ValidationContext<'_>, rules: &[ContainerRule]) -> Verdict {
    for container in ctx.checked_containers() {
        for rule in rules {
            let result = rule(ctx, container);
            if !result.allowed {
                return result;
            }
        }
    }

    Verdict::allowed()
}
