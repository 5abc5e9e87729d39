//! Deployment security-context mutation.
//!
//! When any container of a Deployment lacks an explicitly restricted security
//! context, the webhook rewrites every container so that `privileged` and
//! `allowPrivilegeEscalation` are both `false`, and stamps a status
//! annotation on the Deployment. Compliant Deployments pass through with no
//! patch. Applying the patch reaches a fixed point in one pass.

use std::collections::BTreeMap;

use jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation, ReplaceOperation};
use k8s_openapi::api::apps::v1::Deployment;
use serde_json::Value;

use crate::workload::{deployment_containers, has_restricted_security_context, is_sidecar};

/// Annotation recording that the webhook rewrote the Deployment
pub const MUTATION_STATUS_ANNOTATION: &str = "security-admission-webhook.app-standards.io/status";
/// Value of [`MUTATION_STATUS_ANNOTATION`] after a rewrite
pub const MUTATION_STATUS_MUTATED: &str = "mutated";

/// Whether any non-sidecar container lacks a restricted security context
pub fn needs_mutation(deployment: &Deployment) -> bool {
    deployment_containers(deployment)
        .iter()
        .filter(|container| !is_sidecar(container))
        .any(|container| !has_restricted_security_context(container))
}

/// Build the security-context patch for a Deployment.
///
/// Returns `None` when every non-sidecar container is already restricted.
/// Once a patch is needed, every non-sidecar container gets both flag
/// operations, including containers that were already compliant.
pub fn build_patch(deployment: &Deployment) -> Option<Patch> {
    if !needs_mutation(deployment) {
        return None;
    }

    let mut ops = annotation_operations(deployment.metadata.annotations.as_ref());
    ops.extend(security_context_operations(deployment));
    Some(Patch(ops))
}

/// Operation stamping the mutation status annotation.
///
/// Adds the whole annotation map when the Deployment has none, adds the key
/// when the map exists without it and replaces the key otherwise.
fn annotation_operations(
    annotations: Option<&BTreeMap<String, String>>,
) -> Vec<PatchOperation> {
    let value = Value::String(MUTATION_STATUS_MUTATED.to_string());

    let op = match annotations {
        None => {
            let mut map = serde_json::Map::new();
            map.insert(MUTATION_STATUS_ANNOTATION.to_string(), value);
            PatchOperation::Add(AddOperation {
                path: PointerBuf::from_tokens(["metadata", "annotations"]),
                value: Value::Object(map),
            })
        }
        Some(existing) if existing.contains_key(MUTATION_STATUS_ANNOTATION) => {
            PatchOperation::Replace(ReplaceOperation {
                path: annotation_pointer(),
                value,
            })
        }
        Some(_) => PatchOperation::Add(AddOperation {
            path: annotation_pointer(),
            value,
        }),
    };

    vec![op]
}

fn annotation_pointer() -> PointerBuf {
    PointerBuf::from_tokens(["metadata", "annotations", MUTATION_STATUS_ANNOTATION])
}

/// Per-container operations, in container index order.
///
/// A missing security context is added pre-seeded with both flags so the
/// replace operations that follow always have a target. A flag missing from
/// an existing security context is added rather than replaced.
fn security_context_operations(deployment: &Deployment) -> Vec<PatchOperation> {
    let mut ops = Vec::new();

    for (index, container) in deployment_containers(deployment).iter().enumerate() {
        if is_sidecar(container) {
            continue;
        }

        let (has_privileged, has_escalation) = match &container.security_context {
            Some(sc) => (
                sc.privileged.is_some(),
                sc.allow_privilege_escalation.is_some(),
            ),
            None => {
                ops.push(PatchOperation::Add(AddOperation {
                    path: container_pointer(index, &["securityContext"]),
                    value: serde_json::json!({
                        "privileged": false,
                        "allowPrivilegeEscalation": false,
                    }),
                }));
                (true, true)
            }
        };

        for (field, present) in [
            ("privileged", has_privileged),
            ("allowPrivilegeEscalation", has_escalation),
        ] {
            ops.push(force_false(
                container_pointer(index, &["securityContext", field]),
                present,
            ));
        }
    }

    ops
}

/// Set a boolean field to `false`, replacing it when it already exists
fn force_false(path: PointerBuf, present: bool) -> PatchOperation {
    let value = Value::Bool(false);
    if present {
        PatchOperation::Replace(ReplaceOperation { path, value })
    } else {
        PatchOperation::Add(AddOperation { path, value })
    }
}

/// Pointer below `/spec/template/spec/containers/<index>`
fn container_pointer(index: usize, fields: &[&str]) -> PointerBuf {
    let index = index.to_string();
    let mut tokens = vec!["spec", "template", "spec", "containers", index.as_str()];
    tokens.extend_from_slice(fields);
    PointerBuf::from_tokens(tokens)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment_value(containers: Value) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {
                "selector": {"matchLabels": {"app": "web"}},
                "template": {"spec": {"containers": containers}}
            }
        })
    }

    fn decode(value: &Value) -> Deployment {
        serde_json::from_value(value.clone()).unwrap()
    }

    fn patch_json(patch: &Patch) -> Value {
        serde_json::to_value(patch).unwrap()
    }

    #[test]
    fn test_compliant_deployment_has_no_patch() {
        let value = deployment_value(json!([{
            "name": "app",
            "securityContext": {"privileged": false, "allowPrivilegeEscalation": false}
        }]));
        assert!(build_patch(&decode(&value)).is_none());
    }

    #[test]
    fn test_bare_container_with_sidecar() {
        let value = deployment_value(json!([{"name": "app"}, {"name": "istio-proxy"}]));
        let patch = build_patch(&decode(&value)).unwrap();

        assert_eq!(
            patch_json(&patch),
            json!([
                {
                    "op": "add",
                    "path": "/metadata/annotations",
                    "value": {"security-admission-webhook.app-standards.io/status": "mutated"}
                },
                {
                    "op": "add",
                    "path": "/spec/template/spec/containers/0/securityContext",
                    "value": {"privileged": false, "allowPrivilegeEscalation": false}
                },
                {"op": "replace", "path": "/spec/template/spec/containers/0/securityContext/privileged", "value": false},
                {"op": "replace", "path": "/spec/template/spec/containers/0/securityContext/allowPrivilegeEscalation", "value": false}
            ])
        );
    }

    #[test]
    fn test_sidecar_alone_never_triggers_mutation() {
        let value = deployment_value(json!([{"name": "istio-proxy"}]));
        assert!(build_patch(&decode(&value)).is_none());
    }

    #[test]
    fn test_compliant_containers_rewritten_once_triggered() {
        let value = deployment_value(json!([
            {
                "name": "ok",
                "securityContext": {"privileged": false, "allowPrivilegeEscalation": false}
            },
            {"name": "bad", "securityContext": {"privileged": true}}
        ]));
        let patch = build_patch(&decode(&value)).unwrap();

        // annotation, then two flag operations per container
        assert_eq!(patch.0.len(), 5);
        let paths: Vec<String> = patch
            .0
            .iter()
            .map(|op| match op {
                PatchOperation::Replace(r) => r.path.to_string(),
                PatchOperation::Add(a) => a.path.to_string(),
                other => panic!("unexpected op {:?}", other),
            })
            .collect();
        assert!(paths.contains(&"/spec/template/spec/containers/0/securityContext/privileged".to_string()));
        assert!(paths.contains(&"/spec/template/spec/containers/1/securityContext/privileged".to_string()));
    }

    #[test]
    fn test_missing_flag_in_existing_context_is_added() {
        let value = deployment_value(json!([
            {"name": "app", "securityContext": {"privileged": true}}
        ]));
        let patch = build_patch(&decode(&value)).unwrap();
        let ops = patch_json(&patch);

        assert_eq!(ops.as_array().unwrap().len(), 3);
        assert_eq!(ops[1]["op"], "replace");
        assert_eq!(ops[1]["path"], "/spec/template/spec/containers/0/securityContext/privileged");
        assert_eq!(ops[2]["op"], "add");
        assert_eq!(
            ops[2]["path"],
            "/spec/template/spec/containers/0/securityContext/allowPrivilegeEscalation"
        );
    }

    #[test]
    fn test_existing_annotations_get_key_added() {
        let mut value = deployment_value(json!([{"name": "app"}]));
        value["metadata"]["annotations"] = json!({"team": "a"});
        let patch = build_patch(&decode(&value)).unwrap();

        assert_eq!(
            patch_json(&patch)[0],
            json!({
                "op": "add",
                "path": "/metadata/annotations/security-admission-webhook.app-standards.io~1status",
                "value": "mutated"
            })
        );
    }

    #[test]
    fn test_existing_status_annotation_is_replaced() {
        let mut value = deployment_value(json!([{"name": "app"}]));
        value["metadata"]["annotations"] =
            json!({"security-admission-webhook.app-standards.io/status": ""});
        let patch = build_patch(&decode(&value)).unwrap();

        assert_eq!(patch_json(&patch)[0]["op"], "replace");
    }

    #[test]
    fn test_patch_reaches_fixed_point() {
        let mut value = deployment_value(json!([
            {"name": "app"},
            {"name": "istio-proxy"},
            {"name": "worker", "securityContext": {"allowPrivilegeEscalation": true}}
        ]));
        let patch = build_patch(&decode(&value)).unwrap();

        json_patch::patch(&mut value, &patch.0).unwrap();

        let patched = decode(&value);
        assert!(build_patch(&patched).is_none());
        assert_eq!(
            value["metadata"]["annotations"][MUTATION_STATUS_ANNOTATION],
            MUTATION_STATUS_MUTATED
        );
        // Sidecar left untouched
        assert!(value["spec"]["template"]["spec"]["containers"][1]
            .get("securityContext")
            .is_none());
    }
}
