// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for app-standards-webhook.
//!
//! Uses proptest to generate random workloads and verify admission invariants.

#[path = "../common/mod.rs"]
mod common;

use app_standards_webhook::webhooks::mutation::{
    MUTATION_STATUS_ANNOTATION, MUTATION_STATUS_MUTATED, build_patch, needs_mutation,
};
use app_standards_webhook::webhooks::review::JSON_CONTENT_TYPE;
use app_standards_webhook::webhooks::{DecodedReview, decode_review, mutate_review, validate_review};
use common::fixtures::{ContainerBuilder, DeploymentBuilder, PodBuilder, review_body};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, SecurityContext};
use proptest::prelude::*;
use serde::Serialize;

fn decode<T: Serialize>(uid: &str, kind: &str, namespace: &str, object: &T) -> DecodedReview {
    let body = review_body(uid, kind, namespace, object);
    decode_review(Some(JSON_CONTENT_TYPE), &body).unwrap()
}

/// Strategy for an optional privilege flag.
fn flag() -> impl Strategy<Value = Option<bool>> {
    prop_oneof![Just(None), Just(Some(true)), Just(Some(false))]
}

/// Strategy for a container with arbitrary security, resources and probes.
fn any_container(name: &'static str) -> impl Strategy<Value = Container> {
    (
        prop::option::of((flag(), flag())),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(move |(security, resources, probes)| {
            let mut builder = ContainerBuilder::new(name);
            if let Some((privileged, escalation)) = security {
                builder = builder.raw_security_context(SecurityContext {
                    privileged,
                    allow_privilege_escalation: escalation,
                    ..Default::default()
                });
            }
            if resources {
                builder = builder.resources();
            }
            if probes {
                builder = builder.probes();
            }
            builder.build()
        })
}

/// Strategy for a Deployment with one to four application containers and
/// an optional sidecar.
fn any_deployment() -> impl Strategy<Value = Deployment> {
    (
        prop::collection::vec(any_container("app"), 1..=4),
        prop::option::of(any_container("istio-proxy")),
        any::<bool>(),
    )
        .prop_map(|(containers, sidecar, annotated)| {
            let mut builder = DeploymentBuilder::new("web");
            for (i, mut container) in containers.into_iter().enumerate() {
                container.name = format!("app-{i}");
                builder = builder.container(container);
            }
            if let Some(sidecar) = sidecar {
                builder = builder.container(sidecar);
            }
            if annotated {
                builder = builder.annotation("owner", "team-a");
            }
            builder.build()
        })
}

/// Strategy for namespaces of the form `<project>-<env>`.
fn project_namespace() -> impl Strategy<Value = String> {
    "[a-z]{1,8}-[a-z]{1,8}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The sidecar container never causes a denial, whatever it declares.
    #[test]
    fn sidecar_never_denied(sidecar in any_container("istio-proxy")) {
        let deployment = DeploymentBuilder::new("web")
            .scheduled()
            .container(ContainerBuilder::new("app").compliant().build())
            .container(sidecar)
            .build();

        let response = validate_review(&decode("uid", "Deployment", "teamA-prod", &deployment));
        prop_assert!(response.allowed);
    }

    /// Pods whose name lacks the project prefix are denied with code 402.
    #[test]
    fn pod_without_prefix_denied(namespace in project_namespace(), name in "[a-z]{1,12}") {
        let prefix = format!("{}-", namespace.split_once('-').unwrap().0);
        prop_assume!(!name.starts_with(&prefix));

        let pod = PodBuilder::new(name)
            .node_selector()
            .container(ContainerBuilder::new("app").resources().probes().build())
            .build();
        let response = validate_review(&decode("uid", "Pod", &namespace, &pod));

        prop_assert!(!response.allowed);
        prop_assert_eq!(response.result.code, 402);
        prop_assert_eq!(response.result.reason, "naming convention violated");
    }

    /// Pods carrying the project prefix pass the naming rule.
    #[test]
    fn pod_with_prefix_allowed(namespace in project_namespace(), suffix in "[a-z0-9]{0,12}") {
        let name = format!("{}-{}", namespace.split_once('-').unwrap().0, suffix);
        let pod = PodBuilder::new(name)
            .affinity()
            .container(ContainerBuilder::new("app").resources().probes().build())
            .build();

        let response = validate_review(&decode("uid", "Pod", &namespace, &pod));
        prop_assert!(response.allowed);
    }

    /// A Deployment missing either scheduling field is denied for scheduling,
    /// before any container rule.
    #[test]
    fn deployment_scheduling_required(
        node_selector in any::<bool>(),
        affinity in any::<bool>(),
        container in any_container("app"),
    ) {
        prop_assume!(!(node_selector && affinity));

        let mut builder = DeploymentBuilder::new("web").container(container);
        if node_selector {
            builder = builder.node_selector();
        }
        if affinity {
            builder = builder.affinity();
        }
        let response = validate_review(&decode("uid", "Deployment", "teamA-prod", &builder.build()));

        prop_assert!(!response.allowed);
        prop_assert_eq!(response.result.reason, "no scheduling policy set");
    }

    /// Applying the mutation patch yields a Deployment needing no further patch.
    #[test]
    fn mutation_reaches_fixed_point(deployment in any_deployment()) {
        let Some(patch) = build_patch(&deployment) else {
            prop_assert!(!needs_mutation(&deployment));
            return Ok(());
        };

        let mut value = serde_json::to_value(&deployment).unwrap();
        json_patch::patch(&mut value, &patch.0).unwrap();
        let patched: Deployment = serde_json::from_value(value).unwrap();

        prop_assert!(!needs_mutation(&patched));
        prop_assert!(build_patch(&patched).is_none());
        let annotations = patched.metadata.annotations.clone().unwrap_or_default();
        prop_assert_eq!(
            annotations.get(MUTATION_STATUS_ANNOTATION).map(String::as_str),
            Some(MUTATION_STATUS_MUTATED)
        );
    }

    /// Mutation never touches the sidecar.
    #[test]
    fn mutation_skips_sidecar(deployment in any_deployment()) {
        let response = mutate_review(&decode("uid", "Deployment", "teamA-prod", &deployment));
        prop_assert!(response.allowed);

        let sidecar_index = deployment
            .spec.as_ref().unwrap()
            .template.spec.as_ref().unwrap()
            .containers.iter()
            .position(|container| container.name == "istio-proxy");
        if let (Some(bytes), Some(index)) = (response.patch, sidecar_index) {
            let ops: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
            let sidecar_path = format!("/spec/template/spec/containers/{index}");
            prop_assert!(ops.iter().all(|op| !op["path"].as_str().unwrap().starts_with(&sidecar_path)));
        }
    }

    /// Every response carries the request uid.
    #[test]
    fn uid_echoed(uid in "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{12}", deployment in any_deployment()) {
        let review = decode(&uid, "Deployment", "teamA-prod", &deployment);
        let validated = validate_review(&review);
        let mutated = mutate_review(&review);
        prop_assert_eq!(validated.uid, uid.clone());
        prop_assert_eq!(mutated.uid, uid);
    }
}
