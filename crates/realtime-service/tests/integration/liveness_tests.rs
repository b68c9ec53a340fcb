//! Keepalive and read-deadline behavior against real clients.

use crate::fixtures::{comment, PROMPT};
use realtime_service::config::Config;
use realtime_test_utils::{TestRealtimeServer, WsTestClient};
use std::time::Duration;

fn short_deadline(pong_wait_seconds: u64) -> Config {
    Config {
        pong_wait_seconds,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_silent_client_is_unregistered_after_read_deadline() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn_with(short_deadline(1)).await?;

    // Never read: pings go unanswered and nothing else is sent
    let mut client = WsTestClient::connect(&server.ws_url()).await?;
    server.wait_for_active(1, PROMPT).await?;

    server
        .wait_for_active(0, Duration::from_secs(1) + PROMPT)
        .await?;
    assert_eq!(server.metrics().mailbox_closes(), 1);
    assert_eq!(server.metrics().sessions_shed(), 0);

    client.wait_for_close(PROMPT).await?;
    Ok(())
}

#[tokio::test]
async fn test_reading_client_answers_pings_and_stays_registered() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn_with(short_deadline(3)).await?;
    let mut client = WsTestClient::connect(&server.ws_url()).await?;
    client.next_events(PROMPT).await?;

    // Reading for longer than the deadline answers every ping on the way
    let idle = client.next_text(Duration::from_secs(5)).await;
    assert!(idle.is_err(), "no data frames expected while idle");

    assert_eq!(server.hub().active_count().await?, 1);

    server.hub().publish(comment("still-here"));
    let events = client.next_events(PROMPT).await?;
    assert_eq!(events[0]["data"]["id"], "still-here");
    Ok(())
}

#[tokio::test]
async fn test_client_traffic_refreshes_read_deadline() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn_with(short_deadline(2)).await?;
    let mut client = WsTestClient::connect(&server.ws_url()).await?;

    // Application frames alone keep the session alive, without reading pings
    for _ in 0..6 {
        client.send_text(r#"{"type":"heartbeat"}"#).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    assert_eq!(server.hub().active_count().await?, 1);
    Ok(())
}
