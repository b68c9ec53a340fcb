//! Acknowledgement, fan-out, ordering and batching over real WebSockets.

use crate::fixtures::{comment, post, PROMPT};
use realtime_service::events::CONNECTION_ACK_MESSAGE;
use realtime_test_utils::{TestRealtimeServer, WsTestClient};

/// Connect and consume the acknowledgement.
async fn connected(server: &TestRealtimeServer) -> Result<WsTestClient, anyhow::Error> {
    let mut client = WsTestClient::connect(&server.ws_url()).await?;
    let ack = client.next_events(PROMPT).await?;
    assert_eq!(ack.len(), 1);
    assert_eq!(ack[0]["type"], "connection");
    Ok(client)
}

#[tokio::test]
async fn test_connection_ack_is_first_frame() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let mut client = WsTestClient::connect(&server.ws_url()).await?;

    let first = client.next_events(PROMPT).await?;

    assert_eq!(first.len(), 1, "ack must be alone in the first frame");
    assert_eq!(first[0]["type"], "connection");
    assert_eq!(first[0]["message"], CONNECTION_ACK_MESSAGE);
    assert!(first[0].get("data").is_none(), "absent fields are omitted");
    assert_eq!(server.hub().active_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_fan_out_to_every_client_then_unregister_one() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let mut c1 = connected(&server).await?;
    let mut c2 = connected(&server).await?;
    let mut c3 = connected(&server).await?;
    server.wait_for_active(3, PROMPT).await?;

    server.hub().publish(comment("c1"));

    for client in [&mut c1, &mut c2, &mut c3] {
        let events = client.next_events(PROMPT).await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "new_comment");
        assert_eq!(events[0]["data"]["id"], "c1");
    }

    c3.close().await?;
    server.wait_for_active(2, PROMPT).await?;

    server.hub().publish(comment("c2"));
    for client in [&mut c1, &mut c2] {
        let events = client.next_events(PROMPT).await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["data"]["id"], "c2");
    }
    assert_eq!(server.hub().active_count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_per_session_order_and_batch_boundaries() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let mut client = connected(&server).await?;

    let ids: Vec<String> = (0..20).map(|i| format!("p{i}")).collect();
    for id in &ids {
        server.hub().publish(post(id));
    }

    let (events, frames) = client.collect_events(ids.len(), PROMPT).await?;

    assert!(frames <= ids.len());
    let received: Vec<&str> = events
        .iter()
        .map(|e| e["data"]["id"].as_str().unwrap())
        .collect();
    assert_eq!(received, ids.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(events.iter().all(|e| e["type"] == "new_blog_post"));
    Ok(())
}

#[tokio::test]
async fn test_malformed_inbound_frame_keeps_session_open() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let mut client = connected(&server).await?;

    client.send_text("this is not json").await?;
    client.send_text(r#"{"type":"ping"}"#).await?;
    server.hub().publish(comment("after-garbage"));

    let events = client.next_events(PROMPT).await?;
    assert_eq!(events[0]["data"]["id"], "after-garbage");
    assert_eq!(server.hub().active_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_oversized_inbound_frame_ends_session() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let mut client = connected(&server).await?;

    let limit = server.config().max_message_bytes;
    client.send_text(&"x".repeat(limit * 2)).await?;

    client.wait_for_close(PROMPT).await?;
    server.wait_for_active(0, PROMPT).await?;
    Ok(())
}

#[tokio::test]
async fn test_client_close_unregisters() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let client = connected(&server).await?;
    server.wait_for_active(1, PROMPT).await?;

    client.close().await?;

    server.wait_for_active(0, PROMPT).await?;
    assert_eq!(server.metrics().mailbox_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_stopped_hub_closes_upgraded_socket() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    server.hub().shutdown().await?;

    let mut client = WsTestClient::connect(&server.ws_url()).await?;

    client.wait_for_close(PROMPT).await?;
    assert_eq!(server.metrics().registrations(), 0);
    Ok(())
}
