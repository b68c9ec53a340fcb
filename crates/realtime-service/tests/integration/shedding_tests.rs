//! Slow-consumer shedding with live clients on the same hub.

use crate::fixtures::{comment, PROMPT};
use common::types::{SessionId, SubscriberId};
use realtime_service::actors::Session;
use realtime_test_utils::{TestRealtimeServer, WsTestClient};
use std::sync::Arc;

#[tokio::test]
async fn test_undrained_session_is_shed_exactly_once() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;
    let mut live = WsTestClient::connect(&server.ws_url()).await?;
    live.next_events(PROMPT).await?;

    // A subscriber whose mailbox is never drained
    let (stalled, _mailbox) = Session::new(
        SessionId::new(),
        Some(SubscriberId::from("stalled".to_string())),
        1,
    );
    server.hub().register(Arc::clone(&stalled)).await?;
    assert_eq!(server.hub().active_count().await?, 2);

    for i in 0..5 {
        server.hub().publish(comment(&format!("c{i}")));
    }

    let (events, _) = live.collect_events(5, PROMPT).await?;
    assert_eq!(events.len(), 5, "the live client keeps receiving");

    assert_eq!(server.hub().active_count().await?, 1);
    assert_eq!(stalled.mailbox_close_count(), 1);
    assert!(!stalled.is_mailbox_open());
    assert_eq!(server.metrics().sessions_shed(), 1);

    // A late unregister from the stalled session's own pumps is a no-op
    server.hub().unregister(Arc::clone(&stalled)).await?;
    assert_eq!(stalled.mailbox_close_count(), 1);
    assert_eq!(server.metrics().mailbox_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_publish_never_waits_for_slow_consumers() -> Result<(), anyhow::Error> {
    let server = TestRealtimeServer::spawn().await?;

    let mut stalled = Vec::new();
    for _ in 0..10 {
        let (session, mailbox) = Session::new(SessionId::new(), None, 2);
        server.hub().register(Arc::clone(&session)).await?;
        stalled.push((session, mailbox));
    }

    let started = std::time::Instant::now();
    for i in 0..1_000 {
        server.hub().publish(comment(&format!("c{i}")));
    }
    assert!(started.elapsed() < PROMPT, "publish must not block");

    server.wait_for_active(0, PROMPT).await?;
    assert!(stalled
        .iter()
        .all(|(session, _)| session.mailbox_close_count() == 1));
    Ok(())
}
