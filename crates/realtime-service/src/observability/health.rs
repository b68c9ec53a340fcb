//! Health endpoints for the realtime service.
//!
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (hub running and listener bound?)
//!
//! The `/metrics` endpoint is served separately via `metrics-exporter-prometheus`.

use crate::actors::HubHandle;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health state for the realtime service.
#[derive(Debug)]
pub struct HealthState {
    /// Always true after startup initialization.
    live: AtomicBool,
    /// True once the listener is bound; cleared when shutdown begins.
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the service as not ready (e.g., during shutdown).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct ProbeState {
    health: Arc<HealthState>,
    hub: HubHandle,
}

/// Create the health router with liveness and readiness endpoints.
///
/// `/ready` answers 200 only while `health` is ready and the hub actor is
/// still running.
pub fn health_router(health: Arc<HealthState>, hub: HubHandle) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(ProbeState { health, hub })
}

async fn liveness_handler(State(state): State<ProbeState>) -> StatusCode {
    if state.health.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(State(state): State<ProbeState>) -> StatusCode {
    if state.health.is_ready() && state.hub.is_running() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{HubConfig, HubMetrics};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn hub() -> HubHandle {
        HubHandle::spawn(HubConfig::default(), HubMetrics::new())
    }

    async fn probe(app: Router, uri: &str) -> StatusCode {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");

        app.oneshot(request)
            .await
            .expect("Failed to execute request")
            .status()
    }

    #[test]
    fn test_health_state_default() {
        let state = HealthState::new();
        assert!(state.is_live(), "Should be live by default");
        assert!(!state.is_ready(), "Should not be ready by default");
    }

    #[test]
    fn test_health_state_set_ready() {
        let state = HealthState::new();

        state.set_ready();
        assert!(state.is_ready());

        state.set_not_ready();
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_liveness_endpoint() {
        let app = health_router(Arc::new(HealthState::new()), hub());
        assert_eq!(probe(app, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_endpoint_not_ready() {
        let app = health_router(Arc::new(HealthState::new()), hub());
        assert_eq!(
            probe(app, "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE,
            "/ready should return 503 before the listener is bound"
        );
    }

    #[tokio::test]
    async fn test_readiness_endpoint_ready() {
        let health = Arc::new(HealthState::new());
        health.set_ready();
        let app = health_router(health, hub());

        assert_eq!(probe(app, "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_endpoint_after_hub_shutdown() {
        let health = Arc::new(HealthState::new());
        health.set_ready();
        let hub = hub();
        let app = health_router(health, hub.clone());

        hub.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(probe(app, "/ready").await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_path_returns_404() {
        let app = health_router(Arc::new(HealthState::new()), hub());
        assert_eq!(probe(app, "/nope").await, StatusCode::NOT_FOUND);
    }
}
