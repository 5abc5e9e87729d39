//! Workload model for admission decisions.
//!
//! A [`Workload`] is a read-only view over the parts of a Deployment or Pod
//! that the admission policies inspect. Fields that users may omit stay
//! `Option`al: an explicit `privileged: false` is not the same as an unset
//! `privileged`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Affinity, Container, Pod, PodSpec};
use kube::core::DynamicObject;
use kube::core::dynamic::ParseDynamicObjectError;

/// Name of the injected service-mesh sidecar, exempt from container rules.
pub const SIDECAR_CONTAINER_NAME: &str = "istio-proxy";

/// Kind of object carried by an admission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    Pod,
    /// Any kind the policies do not apply to
    Other(String),
}

impl WorkloadKind {
    /// Map the `request.kind.kind` discriminator to a workload kind
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "Deployment" => WorkloadKind::Deployment,
            "Pod" => WorkloadKind::Pod,
            other => WorkloadKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::Pod => "Pod",
            WorkloadKind::Other(kind) => kind,
        }
    }
}

impl WorkloadKind {
    /// Bounded label for metrics; every unhandled kind shares one series
    pub fn metric_label(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::Pod => "Pod",
            WorkloadKind::Other(_) => "Other",
        }
    }
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workload under admission review
#[derive(Debug, Clone)]
pub enum Workload {
    Deployment(Box<Deployment>),
    Pod(Box<Pod>),
}

impl Workload {
    /// Parse the request object for the given kind.
    ///
    /// Returns `None` for kinds outside the policy scope; those are never
    /// parsed.
    pub fn from_object(
        kind: &WorkloadKind,
        object: DynamicObject,
    ) -> Option<Result<Self, ParseDynamicObjectError>> {
        match kind {
            WorkloadKind::Deployment => Some(
                object
                    .try_parse::<Deployment>()
                    .map(|d| Workload::Deployment(Box::new(d))),
            ),
            WorkloadKind::Pod => Some(
                object
                    .try_parse::<Pod>()
                    .map(|p| Workload::Pod(Box::new(p))),
            ),
            WorkloadKind::Other(_) => None,
        }
    }

    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::Pod(_) => WorkloadKind::Pod,
        }
    }

    /// Object name, empty when the submitted object has none
    pub fn name(&self) -> &str {
        let metadata = match self {
            Workload::Deployment(d) => &d.metadata,
            Workload::Pod(p) => &p.metadata,
        };
        metadata.name.as_deref().unwrap_or_default()
    }

    /// Pod spec: the template spec for Deployments, the spec itself for Pods
    pub fn pod_spec(&self) -> Option<&PodSpec> {
        match self {
            Workload::Deployment(d) => deployment_pod_spec(d),
            Workload::Pod(p) => p.spec.as_ref(),
        }
    }

    /// Containers in declaration order
    pub fn containers(&self) -> &[Container] {
        self.pod_spec()
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default()
    }

    pub fn node_selector(&self) -> Option<&BTreeMap<String, String>> {
        self.pod_spec().and_then(|spec| spec.node_selector.as_ref())
    }

    pub fn affinity(&self) -> Option<&Affinity> {
        self.pod_spec().and_then(|spec| spec.affinity.as_ref())
    }
}

/// Pod template spec of a Deployment, if any
pub fn deployment_pod_spec(deployment: &Deployment) -> Option<&PodSpec> {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
}

/// Containers of a Deployment's pod template in declaration order
pub fn deployment_containers(deployment: &Deployment) -> &[Container] {
    deployment_pod_spec(deployment)
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default()
}

/// Whether the container is the mesh sidecar and skips container rules
pub fn is_sidecar(container: &Container) -> bool {
    container.name == SIDECAR_CONTAINER_NAME
}

/// Both privilege flags are explicitly set to `false`
pub fn has_restricted_security_context(container: &Container) -> bool {
    container.security_context.as_ref().is_some_and(|sc| {
        sc.allow_privilege_escalation == Some(false) && sc.privileged == Some(false)
    })
}

/// Both resource limits and requests are declared and non-empty
pub fn declares_resources(container: &Container) -> bool {
    container.resources.as_ref().is_some_and(|resources| {
        resources.limits.as_ref().is_some_and(|l| !l.is_empty())
            && resources.requests.as_ref().is_some_and(|r| !r.is_empty())
    })
}

/// Both liveness and readiness probes are declared
pub fn declares_probes(container: &Container) -> bool {
    container.liveness_probe.is_some() && container.readiness_probe.is_some()
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Workload {
    /// Parse a JSON object literal the way the decoder would
    pub(crate) fn from_json(
        kind: &WorkloadKind,
        object: serde_json::Value,
    ) -> Option<Result<Self, ParseDynamicObjectError>> {
        let object: DynamicObject =
            serde_json::from_value(object).expect("object literal is a valid DynamicObject");
        Self::from_object(kind, object)
    }
}
