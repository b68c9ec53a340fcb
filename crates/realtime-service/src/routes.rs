//! HTTP routes for the realtime service.
//!
//! Defines the Axum router and application state.

use crate::actors::{HubHandle, SessionTimings};
use crate::config::Config;
use crate::gateway::{attach_subscriber_identity, ws_upgrade};
use crate::observability::{health_router, HealthState};
use axum::{extract::State, middleware, response::IntoResponse, routing::get, Router};
use common::jwt::SubscriberTokenValidator;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast hub.
    pub hub: HubHandle,

    /// Service configuration.
    pub config: Arc<Config>,

    /// Session deadlines derived from `config`.
    pub timings: SessionTimings,

    /// Liveness and readiness flags.
    pub health: Arc<HealthState>,

    /// Present only when a signing secret is configured.
    pub token_validator: Option<Arc<SubscriberTokenValidator>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, hub: HubHandle, health: Arc<HealthState>) -> Self {
        let token_validator = config
            .jwt_secret
            .as_ref()
            .map(|secret| Arc::new(SubscriberTokenValidator::new(secret)));

        Self {
            hub,
            timings: config.session_timings(),
            config: Arc::new(config),
            health,
            token_validator,
        }
    }
}

/// Build the application routes.
///
/// - `/ws` - WebSocket upgrade, with optional bearer identity
/// - `/health` - Liveness probe
/// - `/ready` - Readiness probe
/// - `/metrics` - Prometheus metrics endpoint
/// - TraceLayer for request logging
pub fn build_routes(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let ws_routes = Router::new()
        .route("/ws", get(ws_upgrade))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            attach_subscriber_identity,
        ))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .merge(ws_routes)
        .merge(metrics_routes)
        .merge(health_router(state.health, state.hub))
        .layer(TraceLayer::new_for_http())
}

#[tracing::instrument(skip_all, name = "rt.metrics.scrape")]
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{HubConfig, HubMetrics};
    use crate::observability::metrics::prometheus_builder;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::secret::SecretString;
    use tower::util::ServiceExt;

    fn app_state(config: Config) -> AppState {
        let hub = HubHandle::spawn(config.hub_config(), HubMetrics::new());
        AppState::new(config, hub, Arc::new(HealthState::new()))
    }

    fn app(state: AppState) -> Router {
        let handle = prometheus_builder().unwrap().build_recorder().handle();
        build_routes(state, handle)
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_app_state_without_secret_has_no_validator() {
        let hub = HubHandle::spawn(HubConfig::default(), HubMetrics::new());
        let state = AppState::new(Config::default(), hub, Arc::new(HealthState::new()));
        assert!(state.token_validator.is_none());
        assert_eq!(state.timings, Config::default().session_timings());
    }

    #[tokio::test]
    async fn test_app_state_with_secret_builds_validator() {
        let state = app_state(Config {
            jwt_secret: Some(SecretString::from("route-test-secret".to_string())),
            ..Config::default()
        });
        assert!(state.token_validator.is_some());
    }

    #[tokio::test]
    async fn test_health_and_ready_routes() {
        let state = app_state(Config::default());
        assert_eq!(get_status(app(state.clone()), "/health").await, StatusCode::OK);
        assert_eq!(
            get_status(app(state.clone()), "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.health.set_ready();
        assert_eq!(get_status(app(state), "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let state = app_state(Config::default());
        assert_eq!(get_status(app(state), "/metrics").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_plain_get_on_ws_is_rejected_before_registration() {
        let state = app_state(Config::default());
        let status = get_status(app(state.clone()), "/ws").await;

        assert!(status.is_client_error(), "got {status}");
        assert_eq!(state.hub.active_count().await.unwrap(), 0);
    }
}
