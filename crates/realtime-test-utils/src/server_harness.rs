//! Test server harness for E2E testing
//!
//! Provides `TestRealtimeServer` for spawning real realtime service instances
//! in tests.

use metrics_exporter_prometheus::PrometheusBuilder;
use realtime_service::actors::{HubHandle, HubMetrics};
use realtime_service::config::Config;
use realtime_service::observability::{init_metrics_recorder, HealthState};
use realtime_service::routes::{build_routes, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Test harness for spawning the realtime service in E2E tests
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_fan_out_e2e() -> anyhow::Result<()> {
///     let server = TestRealtimeServer::spawn().await?;
///     let mut client = WsTestClient::connect(&server.ws_url()).await?;
///
///     server.hub().publish(Event::Error("boom".to_string()));
///     Ok(())
/// }
/// ```
pub struct TestRealtimeServer {
    addr: SocketAddr,
    hub: HubHandle,
    health: Arc<HealthState>,
    config: Config,
    handle: JoinHandle<()>,
}

impl TestRealtimeServer {
    /// Spawn a server with default configuration
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(Config::default()).await
    }

    /// Spawn a server with the given configuration
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0), ignoring `bind_address`
    /// - Start its own hub actor
    /// - Report ready before returning
    pub async fn spawn_with(mut config: Config) -> Result<Self, anyhow::Error> {
        config.bind_address = "127.0.0.1:0".to_string();

        let hub = HubHandle::spawn(config.hub_config(), HubMetrics::new());
        let health = Arc::new(HealthState::new());
        let state = AppState::new(config.clone(), hub.clone(), Arc::clone(&health));

        // The global recorder can only be installed once per test process;
        // later servers get a standalone recorder.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => PrometheusBuilder::new().build_recorder().handle(),
        };

        let app = build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        health.set_ready();

        Ok(Self {
            addr,
            hub,
            health,
            config,
            handle,
        })
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the WebSocket endpoint URL
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the server's hub
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Get the server's hub counters
    pub fn metrics(&self) -> &Arc<HubMetrics> {
        self.hub.metrics()
    }

    /// Get the server's health flags
    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    /// Get the configuration the server was started with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Poll the hub until it reports `expected` registered sessions
    pub async fn wait_for_active(
        &self,
        expected: usize,
        wait: Duration,
    ) -> Result<(), anyhow::Error> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let active = self.hub.active_count().await?;
            if active == expected {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("expected {expected} active sessions, hub reports {active}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestRealtimeServer {
    fn drop(&mut self) {
        self.handle.abort();
        self.hub.cancel();
    }
}
