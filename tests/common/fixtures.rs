//! Test fixtures and builder patterns for workloads and admission reviews.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, HTTPGetAction, Pod, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;

/// Builder for creating Container test fixtures.
///
/// # Example
/// ```
/// let container = ContainerBuilder::new("app").compliant().build();
/// ```
#[derive(Clone, Debug)]
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    /// Create a bare container: no security context, resources or probes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            container: Container {
                name: name.into(),
                image: Some("registry.local/app:1.0".to_string()),
                ..Default::default()
            },
        }
    }

    /// Set both privilege flags explicitly.
    pub fn security_context(mut self, privileged: bool, allow_escalation: bool) -> Self {
        self.container.security_context = Some(SecurityContext {
            privileged: Some(privileged),
            allow_privilege_escalation: Some(allow_escalation),
            ..Default::default()
        });
        self
    }

    /// Set an arbitrary (possibly partial) security context.
    pub fn raw_security_context(mut self, security_context: SecurityContext) -> Self {
        self.container.security_context = Some(security_context);
        self
    }

    /// Declare CPU/memory limits and requests.
    pub fn resources(mut self) -> Self {
        self.container.resources = Some(ResourceRequirements {
            limits: Some(quantities("500m", "256Mi")),
            requests: Some(quantities("100m", "128Mi")),
            ..Default::default()
        });
        self
    }

    /// Declare limits only.
    pub fn limits_only(mut self) -> Self {
        self.container.resources = Some(ResourceRequirements {
            limits: Some(quantities("500m", "256Mi")),
            ..Default::default()
        });
        self
    }

    /// Declare liveness and readiness probes.
    pub fn probes(mut self) -> Self {
        self.container.liveness_probe = Some(http_probe("/healthz"));
        self.container.readiness_probe = Some(http_probe("/readyz"));
        self
    }

    /// Declare a liveness probe only.
    pub fn liveness_only(mut self) -> Self {
        self.container.liveness_probe = Some(http_probe("/healthz"));
        self
    }

    /// Restricted security context, resources and probes.
    pub fn compliant(self) -> Self {
        self.security_context(false, false).resources().probes()
    }

    pub fn build(self) -> Container {
        self.container
    }
}

/// Builder for Deployment test fixtures.
#[derive(Clone, Debug)]
pub struct DeploymentBuilder {
    name: String,
    containers: Vec<Container>,
    node_selector: Option<BTreeMap<String, String>>,
    affinity: Option<Affinity>,
    annotations: Option<BTreeMap<String, String>>,
}

impl DeploymentBuilder {
    /// Create a Deployment with no containers and no scheduling policy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            containers: Vec::new(),
            node_selector: None,
            affinity: None,
            annotations: None,
        }
    }

    pub fn container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn node_selector(mut self) -> Self {
        self.node_selector = Some(BTreeMap::from([(
            "node-pool".to_string(),
            "general".to_string(),
        )]));
        self
    }

    pub fn affinity(mut self) -> Self {
        self.affinity = Some(Affinity::default());
        self
    }

    /// Set both nodeSelector and affinity.
    pub fn scheduled(self) -> Self {
        self.node_selector().affinity()
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Deployment {
        let labels = BTreeMap::from([("app".to_string(), self.name.clone())]);
        Deployment {
            metadata: ObjectMeta {
                name: Some(self.name),
                annotations: self.annotations,
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: self.containers,
                        node_selector: self.node_selector,
                        affinity: self.affinity,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }
}

/// Builder for Pod test fixtures.
#[derive(Clone, Debug)]
pub struct PodBuilder {
    name: String,
    containers: Vec<Container>,
    node_selector: Option<BTreeMap<String, String>>,
    affinity: Option<Affinity>,
}

impl PodBuilder {
    /// Create a Pod with no containers and no scheduling policy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            containers: Vec::new(),
            node_selector: None,
            affinity: None,
        }
    }

    pub fn container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn node_selector(mut self) -> Self {
        self.node_selector = Some(BTreeMap::from([(
            "node-pool".to_string(),
            "general".to_string(),
        )]));
        self
    }

    pub fn affinity(mut self) -> Self {
        self.affinity = Some(Affinity::default());
        self
    }

    pub fn build(self) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(self.name),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: self.containers,
                node_selector: self.node_selector,
                affinity: self.affinity,
                ..Default::default()
            }),
            status: None,
        }
    }
}

/// Serialize an AdmissionReview request body for the given object.
pub fn review_body<T: Serialize>(uid: &str, kind: &str, namespace: &str, object: &T) -> Vec<u8> {
    serde_json::to_vec(&review_value(uid, kind, namespace, object))
        .unwrap_or_default()
}

/// AdmissionReview request as a JSON value.
pub fn review_value<T: Serialize>(
    uid: &str,
    kind: &str,
    namespace: &str,
    object: &T,
) -> serde_json::Value {
    let group = if kind == "Deployment" { "apps" } else { "" };
    serde_json::json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": uid,
            "kind": {"group": group, "version": "v1", "kind": kind},
            "resource": {"group": group, "version": "v1", "resource": format!("{}s", kind.to_lowercase())},
            "namespace": namespace,
            "operation": "CREATE",
            "userInfo": {"username": "system:serviceaccount:kube-system:replicaset-controller"},
            "object": serde_json::to_value(object).unwrap_or_default(),
            "oldObject": null,
            "dryRun": false
        }
    })
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(8080),
            ..Default::default()
        }),
        ..Default::default()
    }
}
