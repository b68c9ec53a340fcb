//! Realtime Service
//!
//! Serves `GET /ws` for blog subscribers plus health and metrics endpoints.

use realtime_service::actors::{HubHandle, HubMetrics};
use realtime_service::config::Config;
use realtime_service::observability::{init_metrics_recorder, init_tracing, HealthState};
use realtime_service::routes::{build_routes, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Upper bound on how long shutdown waits for sessions to flush close frames.
const MAX_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing needs the log format, so configuration errors go to stderr
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(config.log_format);

    info!("Starting Realtime Service");
    info!(
        bind_address = %config.bind_address,
        mailbox_capacity = config.mailbox_capacity,
        hub_queue_capacity = config.hub_queue_capacity,
        pong_wait_seconds = config.pong_wait_seconds,
        write_wait_seconds = config.write_wait_seconds,
        max_message_bytes = config.max_message_bytes,
        identity_enabled = config.jwt_secret.is_some(),
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let shutdown_grace = config.session_timings().write_wait.min(MAX_SHUTDOWN_GRACE);
    let hub = HubHandle::spawn(config.hub_config(), HubMetrics::new());
    let health = Arc::new(HealthState::new());
    let state = AppState::new(config, hub.clone(), Arc::clone(&health));
    let app = build_routes(state, prometheus_handle);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind listener");
        e
    })?;
    health.set_ready();
    info!(addr = %addr, "Realtime Service listening");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    let signal_health = Arc::clone(&health);
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_health.set_not_ready();
        signal_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_token.cancelled_owned())
        .await?;

    info!("HTTP server stopped, shutting down hub");
    match hub.shutdown_and_drain(shutdown_grace).await {
        Ok(0) => {}
        Ok(lingering) => warn!(lingering, "Some sessions did not close before exit"),
        Err(e) => warn!(error = %e, "Hub already stopped"),
    }

    info!("Realtime Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received");
}
