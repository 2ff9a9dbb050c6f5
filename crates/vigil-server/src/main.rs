//! Server entrypoint.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use vigil_core::config::EngineConfig;
use vigil_core::session::PauseReason;
use vigil_registry::SessionRegistry;
use vigil_server::{AppState, app, metrics};
use vigil_signaling::hub::SignalingHub;
use vigil_signaling::watchdog::GraceWatchdog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vigil_core::logging::init();
    let config = EngineConfig::from_env();
    let metrics_handle = metrics::install_recorder();

    let registry = Arc::new(SessionRegistry::new(config.violation_retention));
    let hub = Arc::new(SignalingHub::new());

    // Signaling loss past the grace period pauses owned sessions; it never
    // ends them.
    let watchdog = GraceWatchdog::spawn(Arc::clone(&hub), config.signaling_grace_period(), {
        let registry = Arc::clone(&registry);
        move |token| {
            if let Err(e) = registry.mark_paused(&token, &PauseReason::SignalingLost, Utc::now()) {
                warn!(token = %token, error = %e, "grace-period pause skipped");
            }
        }
    });

    let state = Arc::new(AppState::new(
        config,
        Arc::clone(&registry),
        Arc::clone(&hub),
        metrics_handle,
    ));

    let addr = std::env::var("VIGIL_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "vigil server listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    watchdog.shutdown().await;
    Ok(())
}
