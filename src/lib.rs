//! app-standards-webhook library crate
//!
//! Admission webhook enforcing application standards on Deployments and Pods:
//! scheduling policy, restricted security context, resource declarations,
//! health probes and a namespace-derived Pod naming convention.

pub mod config;
pub mod health;
pub mod webhooks;
pub mod workload;

pub use config::Config;
pub use health::HealthState;
pub use webhooks::{WebhookError, create_router, run_webhook_server};
pub use workload::{Workload, WorkloadKind};
