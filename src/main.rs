//! app-standards-webhook - admission webhook enforcing application standards.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Reads configuration from the environment
//! - Runs the webhook server (TLS when `CERT_DIR` is set)
//! - Drains on SIGTERM/SIGINT

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use app_standards_webhook::{Config, HealthState, run_webhook_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("app_standards_webhook=info".parse()?),
        )
        .json()
        .init();

    info!("Starting app-standards-webhook");

    let config = Config::from_env()?;
    info!(
        port = config.port,
        tls = config.cert_dir.is_some(),
        "Loaded configuration"
    );

    let health_state = Arc::new(HealthState::new());

    let server_handle = {
        let health_state = health_state.clone();
        let config = config.clone();
        tokio::spawn(async move { run_webhook_server(&config, health_state).await })
    };

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Ok(())) => error!("Webhook server stopped unexpectedly"),
                Ok(Err(e)) => {
                    error!("Webhook server error: {}", e);
                    return Err(e.into());
                }
                Err(e) => error!("Webhook server task panicked: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Stop receiving new admission traffic
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            info!(
                "Waiting {}s for in-flight requests to complete...",
                config.shutdown_grace.as_secs()
            );
            tokio::time::sleep(config.shutdown_grace).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Webhook stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT. Failing to install a handler is fatal.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
