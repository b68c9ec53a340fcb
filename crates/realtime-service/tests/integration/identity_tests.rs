//! Optional bearer identity on the upgrade request.

use crate::fixtures::PROMPT;
use common::secret::SecretString;
use common::types::SubscriberId;
use realtime_service::actors::{HubHandle, SessionState};
use realtime_service::config::Config;
use realtime_test_utils::{TestRealtimeServer, TestTokenBuilder, WsTestClient, TEST_JWT_SECRET};

/// The subscriber recorded on the only registered session.
async fn sole_subscriber(hub: &HubHandle) -> Result<Option<SubscriberId>, anyhow::Error> {
    let sessions = hub.sessions().await?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].state, SessionState::Open);
    Ok(sessions[0].subscriber.clone())
}

fn with_secret() -> Config {
    Config {
        jwt_secret: Some(SecretString::from(TEST_JWT_SECRET.to_string())),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_valid_token_tags_session_with_subscriber() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn_with(with_secret()).await?;
    let token = TestTokenBuilder::new().for_user("alice").sign(TEST_JWT_SECRET);

    let mut client = WsTestClient::connect_with_token(&server.ws_url(), &token).await?;

    let ack = client.next_events(PROMPT).await?;
    assert_eq!(ack[0]["type"], "connection");
    assert_eq!(
        sole_subscriber(server.hub()).await?,
        Some(SubscriberId::from("alice".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn test_invalid_token_falls_back_to_anonymous() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn_with(with_secret()).await?;
    let expired = TestTokenBuilder::new()
        .for_user("mallory")
        .expires_in(-3600)
        .issued_at(chrono::Utc::now().timestamp() - 7200)
        .sign(TEST_JWT_SECRET);

    let mut client = WsTestClient::connect_with_token(&server.ws_url(), &expired).await?;

    let ack = client.next_events(PROMPT).await?;
    assert_eq!(ack[0]["type"], "connection");
    assert_eq!(sole_subscriber(server.hub()).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_token_ignored_without_configured_secret() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let token = TestTokenBuilder::new().sign("unrelated-secret");

    let mut client = WsTestClient::connect_with_token(&server.ws_url(), &token).await?;

    let ack = client.next_events(PROMPT).await?;
    assert_eq!(ack[0]["type"], "connection");
    assert_eq!(sole_subscriber(server.hub()).await?, None);
    Ok(())
}
