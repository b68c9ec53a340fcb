//! Health, readiness and metrics endpoints over HTTP.

use crate::fixtures::{comment, PROMPT};
use realtime_test_utils::{TestRealtimeServer, WsTestClient};
use reqwest::StatusCode;
use std::time::Duration;

#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_ready_follows_health_flag_and_hub() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let ready_url = format!("{}/ready", server.url());

    assert_eq!(reqwest::get(&ready_url).await?.status(), StatusCode::OK);

    server.health().set_not_ready();
    assert_eq!(
        reqwest::get(&ready_url).await?.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );

    server.health().set_ready();
    server.hub().shutdown().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        reqwest::get(&ready_url).await?.status(),
        StatusCode::SERVICE_UNAVAILABLE,
        "a stopped hub makes the service unready"
    );
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_and_hub_counters() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let mut client = WsTestClient::connect(&server.ws_url()).await?;
    client.next_events(PROMPT).await?;

    server.hub().publish(comment("m1"));
    client.next_events(PROMPT).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let metrics = server.metrics();
    assert_eq!(metrics.registrations(), 1);
    assert_eq!(metrics.active_sessions(), 1);
    assert_eq!(metrics.events_published(), 1);
    assert_eq!(metrics.events_dropped(), 0);
    Ok(())
}
