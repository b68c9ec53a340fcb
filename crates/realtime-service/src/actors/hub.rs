//! `HubActor` - single writer of the subscriber registry.
//!
//! Every membership change and every broadcast goes through one command
//! queue consumed by one task, so the registry is never read and written
//! concurrently:
//!
//! - `register` / `unregister` wait for queue space, then for the actor's
//!   acknowledgement
//! - `publish` is fire-and-forget; when the command queue itself is full the
//!   event is dropped and counted, so publishers never block
//! - delivery into a session mailbox never blocks either: a full mailbox sheds
//!   the session (remove + close), a closed one is removed quietly
//!
//! The hub is an explicit object. Components that publish or register get a
//! cloned [`HubHandle`] (or an `Arc<dyn EventPublisher>`); there is no global
//! instance.

use super::messages::HubMessage;
use super::metrics::{HubMetrics, MailboxMonitor};
use super::session::{Delivery, Session, SessionState};
use crate::config::DEFAULT_HUB_QUEUE_CAPACITY;
use crate::errors::HubError;
use crate::events::{CommentView, Event, PostView};

use common::types::{SessionId, SubscriberId};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How often `shutdown_and_drain` re-checks session states.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Hub construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Bound of the command queue shared by all callers.
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_HUB_QUEUE_CAPACITY,
        }
    }
}

/// Point-in-time view of one registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    /// `None` for anonymous subscribers.
    pub subscriber: Option<SubscriberId>,
    pub state: SessionState,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id(),
            subscriber: session.subscriber().cloned(),
            state: session.state(),
        }
    }
}

/// Publishing seam for use cases that emit domain events.
///
/// Use cases hold an `Arc<dyn EventPublisher>`; wiring picks [`HubHandle`] in
/// the service and [`NoopPublisher`] where realtime delivery is disabled.
pub trait EventPublisher: Send + Sync {
    /// Publish without waiting for delivery.
    fn publish(&self, event: Event);

    fn publish_new_post(&self, post: PostView) {
        self.publish(Event::NewPost(post));
    }

    fn publish_new_comment(&self, comment: CommentView) {
        self.publish(Event::NewComment(comment));
    }
}

/// Publisher that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: Event) {}
}

/// Handle to the `HubActor`.
///
/// Cheap to clone; every clone talks to the same actor.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubMessage>,
    metrics: Arc<HubMetrics>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("closed", &self.sender.is_closed())
            .finish_non_exhaustive()
    }
}

impl HubHandle {
    /// Spawn the hub actor and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(config: HubConfig, metrics: Arc<HubMetrics>) -> Self {
        let queue_capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let cancel_token = CancellationToken::new();

        let actor = HubActor::new(
            receiver,
            cancel_token.clone(),
            Arc::clone(&metrics),
            queue_capacity,
        );
        tokio::spawn(actor.run());

        Self {
            sender,
            metrics,
            cancel_token,
        }
    }

    /// Add a session to the registry. Registering twice is a no-op.
    ///
    /// # Errors
    ///
    /// `HubError::Unavailable` once the hub has shut down.
    pub async fn register(&self, session: Arc<Session>) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubMessage::Register {
                session,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::Unavailable)?;

        rx.await.map_err(|_| HubError::ResponseDropped)
    }

    /// Remove a session and close its mailbox. Absent sessions are ignored.
    ///
    /// # Errors
    ///
    /// `HubError::Unavailable` once the hub has shut down.
    pub async fn unregister(&self, session: Arc<Session>) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubMessage::Unregister {
                session,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::Unavailable)?;

        rx.await.map_err(|_| HubError::ResponseDropped)
    }

    /// Fan an event out to every registered session without waiting.
    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        match self.sender.try_send(HubMessage::Publish {
            event: Arc::new(event),
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.event_dropped();
                warn!(
                    target: "rt.hub",
                    kind = %kind,
                    "Hub command queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.event_dropped();
                debug!(
                    target: "rt.hub",
                    kind = %kind,
                    "Hub not running, dropping event"
                );
            }
        }
    }

    /// Number of registered sessions, read through the hub queue.
    ///
    /// Advisory: may be stale as soon as it returns.
    ///
    /// # Errors
    ///
    /// `HubError::Unavailable` once the hub has shut down.
    pub async fn active_count(&self) -> Result<usize, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubMessage::ActiveCount { respond_to: tx })
            .await
            .map_err(|_| HubError::Unavailable)?;

        rx.await.map_err(|_| HubError::ResponseDropped)
    }

    /// Snapshot of every registered session, in no particular order.
    ///
    /// # Errors
    ///
    /// `HubError::Unavailable` once the hub has shut down.
    pub async fn sessions(&self) -> Result<Vec<SessionSnapshot>, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubMessage::Sessions { respond_to: tx })
            .await
            .map_err(|_| HubError::Unavailable)?;

        rx.await.map_err(|_| HubError::ResponseDropped)
    }

    /// Close every mailbox and stop the actor.
    ///
    /// # Errors
    ///
    /// `HubError::Unavailable` if the hub already stopped.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.request_shutdown().await.map(|_| ())
    }

    /// Shut down, then wait up to `grace` for every session that was still
    /// registered to reach `Closed`, so outbound pumps can flush their close
    /// frames. Returns how many sessions were still open when `grace` ran out.
    ///
    /// # Errors
    ///
    /// `HubError::Unavailable` if the hub already stopped.
    pub async fn shutdown_and_drain(&self, grace: Duration) -> Result<usize, HubError> {
        let sessions = self.request_shutdown().await?;
        let open = |sessions: &[Arc<Session>]| {
            sessions
                .iter()
                .filter(|s| s.state() != SessionState::Closed)
                .count()
        };

        let drained = tokio::time::timeout(grace, async {
            while open(&sessions) > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;

        let lingering = open(&sessions);
        if drained.is_err() {
            warn!(
                target: "rt.hub",
                lingering,
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "Sessions still open after shutdown grace"
            );
        }
        Ok(lingering)
    }

    async fn request_shutdown(&self) -> Result<Vec<Arc<Session>>, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|_| HubError::Unavailable)?;

        rx.await.map_err(|_| HubError::ResponseDropped)
    }

    /// Stop the actor without waiting for acknowledgement.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }
}

impl EventPublisher for HubHandle {
    fn publish(&self, event: Event) {
        HubHandle::publish(self, event);
    }
}

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Unregistered,
    /// Mailbox full during delivery.
    Shed,
    /// Mailbox consumer already gone.
    ConsumerGone,
}

/// The `HubActor` implementation.
pub(crate) struct HubActor {
    receiver: mpsc::Receiver<HubMessage>,
    cancel_token: CancellationToken,
    sessions: HashMap<SessionId, Arc<Session>>,
    metrics: Arc<HubMetrics>,
    mailbox: MailboxMonitor,
    queue_capacity: usize,
}

impl HubActor {
    fn new(
        receiver: mpsc::Receiver<HubMessage>,
        cancel_token: CancellationToken,
        metrics: Arc<HubMetrics>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            receiver,
            cancel_token,
            sessions: HashMap::new(),
            metrics,
            mailbox: MailboxMonitor::for_capacity("hub", queue_capacity),
            queue_capacity,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "rt.actor.hub", fields(queue_capacity = self.queue_capacity))]
    async fn run(mut self) {
        info!(
            target: "rt.hub",
            queue_capacity = self.queue_capacity,
            "Hub started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "rt.hub", "Hub received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        info!(target: "rt.hub", "Hub channel closed, exiting");
                        break;
                    };

                    // Depth including the message just taken
                    self.mailbox.record_depth(self.receiver.len() + 1);
                    let flow = self.handle_message(message);
                    self.mailbox.record_processed();

                    if flow.is_break() {
                        break;
                    }
                }
            }
        }

        self.close_all();
        // Reject anything still queued or sent later
        self.receiver.close();

        info!(
            target: "rt.hub",
            messages_processed = self.mailbox.messages_processed(),
            peak_queue_depth = self.mailbox.peak_depth(),
            "Hub stopped"
        );
    }

    fn handle_message(&mut self, message: HubMessage) -> ControlFlow<()> {
        match message {
            HubMessage::Register {
                session,
                respond_to,
            } => {
                self.register(session);
                let _ = respond_to.send(());
            }

            HubMessage::Unregister {
                session,
                respond_to,
            } => {
                self.remove(&session.id(), Removal::Unregistered);
                let _ = respond_to.send(());
            }

            HubMessage::Publish { event } => self.broadcast(&event),

            HubMessage::ActiveCount { respond_to } => {
                let _ = respond_to.send(self.sessions.len());
            }

            HubMessage::Sessions { respond_to } => {
                let snapshot = self
                    .sessions
                    .values()
                    .map(|session| SessionSnapshot::from(session.as_ref()))
                    .collect();
                let _ = respond_to.send(snapshot);
            }

            HubMessage::Shutdown { respond_to } => {
                info!(
                    target: "rt.hub",
                    sessions = self.sessions.len(),
                    "Hub shutting down"
                );
                let _ = respond_to.send(self.close_all());
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    fn register(&mut self, session: Arc<Session>) {
        let session_id = session.id();
        if self.sessions.contains_key(&session_id) {
            debug!(
                target: "rt.hub",
                session_id = %session_id,
                "Session already registered"
            );
            return;
        }

        self.sessions.insert(session_id, session);
        self.metrics.session_registered(self.sessions.len());

        debug!(
            target: "rt.hub",
            session_id = %session_id,
            active = self.sessions.len(),
            "Session registered"
        );
    }

    fn broadcast(&mut self, event: &Arc<Event>) {
        let kind = event.kind();
        let mut removals = Vec::new();

        for (session_id, session) in &self.sessions {
            match session.try_deliver(Arc::clone(event)) {
                Delivery::Delivered => {}
                Delivery::Full => removals.push((*session_id, Removal::Shed)),
                Delivery::Closed => removals.push((*session_id, Removal::ConsumerGone)),
            }
        }

        let delivered = self.sessions.len() - removals.len();
        for (session_id, reason) in removals {
            self.remove(&session_id, reason);
        }

        self.metrics.event_published(kind);
        debug!(
            target: "rt.hub",
            kind = %kind,
            delivered = delivered,
            "Event published"
        );
    }

    /// Single removal path: drop from the registry and close the mailbox.
    fn remove(&mut self, session_id: &SessionId, reason: Removal) {
        let Some(session) = self.sessions.remove(session_id) else {
            debug!(
                target: "rt.hub",
                session_id = %session_id,
                "Unregister for unknown session ignored"
            );
            return;
        };

        if session.close_mailbox() {
            self.metrics.mailbox_closed();
        }
        self.metrics.session_removed(self.sessions.len());

        match reason {
            Removal::Shed => {
                self.metrics.session_shed();
                warn!(
                    target: "rt.hub",
                    session_id = %session_id,
                    mailbox_capacity = session.mailbox_capacity(),
                    active = self.sessions.len(),
                    "Shedding slow session: mailbox full"
                );
            }
            Removal::Unregistered | Removal::ConsumerGone => {
                debug!(
                    target: "rt.hub",
                    session_id = %session_id,
                    reason = ?reason,
                    active = self.sessions.len(),
                    "Session unregistered"
                );
            }
        }
    }

    fn close_all(&mut self) -> Vec<Arc<Session>> {
        if self.sessions.is_empty() {
            return Vec::new();
        }

        let closed: Vec<Arc<Session>> = self.sessions.drain().map(|(_, s)| s).collect();
        for session in &closed {
            if session.close_mailbox() {
                self.metrics.mailbox_closed();
            }
        }
        self.metrics.session_removed(0);
        closed
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::actors::session::MailboxReceiver;
    use chrono::Utc;
    use std::time::Duration;

    fn spawn_hub() -> HubHandle {
        HubHandle::spawn(HubConfig::default(), HubMetrics::new())
    }

    fn new_session(capacity: usize) -> (Arc<Session>, MailboxReceiver) {
        Session::new(SessionId::new(), None, capacity)
    }

    fn comment(id: &str) -> CommentView {
        let now = Utc::now();
        CommentView {
            id: id.to_string(),
            blog_post_id: "p1".to_string(),
            author_id: "u1".to_string(),
            content: "hello".to_string(),
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn drain(mailbox: &mut MailboxReceiver) -> Vec<Arc<Event>> {
        let mut events = Vec::new();
        while let Ok(event) = mailbox.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_sessions_snapshot_reports_subscribers() {
        let hub = spawn_hub();
        let (named, _rx_named) = Session::new(
            SessionId::new(),
            Some(SubscriberId::from("alice".to_string())),
            4,
        );
        named.mark_open();
        let (anonymous, _rx_anon) = new_session(4);
        hub.register(Arc::clone(&named)).await.unwrap();
        hub.register(Arc::clone(&anonymous)).await.unwrap();

        let mut snapshot = hub.sessions().await.unwrap();
        snapshot.sort_by_key(|s| s.subscriber.is_none());

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].session_id, named.id());
        assert_eq!(
            snapshot[0].subscriber,
            Some(SubscriberId::from("alice".to_string()))
        );
        assert_eq!(snapshot[0].state, SessionState::Open);
        assert_eq!(snapshot[1].session_id, anonymous.id());
        assert_eq!(snapshot[1].subscriber, None);

        hub.unregister(Arc::clone(&named)).await.unwrap();
        let remaining = hub.sessions().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].session_id, anonymous.id());
    }

    #[tokio::test]
    async fn test_register_and_active_count() {
        let hub = spawn_hub();
        assert_eq!(hub.active_count().await.unwrap(), 0);

        let (a, _rx_a) = new_session(4);
        let (b, _rx_b) = new_session(4);
        hub.register(a).await.unwrap();
        hub.register(b).await.unwrap();

        assert_eq!(hub.active_count().await.unwrap(), 2);
        assert_eq!(hub.metrics().active_sessions(), 2);
        hub.cancel();
    }

    #[tokio::test]
    async fn test_register_twice_counts_once() {
        let hub = spawn_hub();
        let (session, _rx) = new_session(4);

        hub.register(Arc::clone(&session)).await.unwrap();
        hub.register(Arc::clone(&session)).await.unwrap();

        assert_eq!(hub.active_count().await.unwrap(), 1);
        assert_eq!(hub.metrics().registrations(), 1);
        hub.cancel();
    }

    #[tokio::test]
    async fn test_unregister_closes_mailbox_exactly_once() {
        let hub = spawn_hub();
        let (session, _rx) = new_session(4);
        hub.register(Arc::clone(&session)).await.unwrap();

        hub.unregister(Arc::clone(&session)).await.unwrap();
        hub.unregister(Arc::clone(&session)).await.unwrap();

        assert_eq!(hub.active_count().await.unwrap(), 0);
        assert_eq!(session.mailbox_close_count(), 1);
        assert_eq!(hub.metrics().mailbox_closes(), 1);
        hub.cancel();
    }

    #[tokio::test]
    async fn test_unregister_unknown_session_is_noop() {
        let hub = spawn_hub();
        let (member, _rx_member) = new_session(4);
        let (stranger, _rx_stranger) = new_session(4);
        hub.register(Arc::clone(&member)).await.unwrap();

        hub.unregister(Arc::clone(&stranger)).await.unwrap();

        assert_eq!(hub.active_count().await.unwrap(), 1);
        assert!(stranger.is_mailbox_open());
        assert_eq!(hub.metrics().mailbox_closes(), 0);
        hub.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_unregister_closes_once() {
        let hub = spawn_hub();

        for _ in 0..50 {
            let (session, _rx) = new_session(4);
            hub.register(Arc::clone(&session)).await.unwrap();

            let first = tokio::spawn({
                let hub = hub.clone();
                let session = Arc::clone(&session);
                async move { hub.unregister(session).await }
            });
            let second = tokio::spawn({
                let hub = hub.clone();
                let session = Arc::clone(&session);
                async move { hub.unregister(session).await }
            });
            first.await.unwrap().unwrap();
            second.await.unwrap().unwrap();

            assert_eq!(session.mailbox_close_count(), 1);
        }

        assert_eq!(hub.active_count().await.unwrap(), 0);
        assert_eq!(hub.metrics().mailbox_closes(), 50);
        hub.cancel();
    }

    #[tokio::test]
    async fn test_fan_out_delivers_once_per_session_in_publish_order() {
        let hub = spawn_hub();
        let mut mailboxes = Vec::new();
        for _ in 0..5 {
            let (session, rx) = new_session(16);
            hub.register(session).await.unwrap();
            mailboxes.push(rx);
        }

        for i in 0..3 {
            hub.publish(Event::Error(format!("event-{i}")));
        }
        // Queue barrier: every earlier publish has been processed
        assert_eq!(hub.active_count().await.unwrap(), 5);

        for mailbox in &mut mailboxes {
            let received: Vec<Event> = drain(mailbox).iter().map(|e| (**e).clone()).collect();
            assert_eq!(
                received,
                vec![
                    Event::Error("event-0".to_string()),
                    Event::Error("event-1".to_string()),
                    Event::Error("event-2".to_string()),
                ]
            );
        }
        assert_eq!(hub.metrics().events_published(), 3);
        hub.cancel();
    }

    #[tokio::test]
    async fn test_fan_out_shares_one_event_allocation() {
        let hub = spawn_hub();
        let (a, mut rx_a) = new_session(4);
        let (b, mut rx_b) = new_session(4);
        hub.register(a).await.unwrap();
        hub.register(b).await.unwrap();

        hub.publish(Event::Error("shared".to_string()));
        hub.active_count().await.unwrap();

        let from_a = rx_a.try_recv().unwrap();
        let from_b = rx_b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&from_a, &from_b));
        hub.cancel();
    }

    #[tokio::test]
    async fn test_three_sessions_new_comment_then_unregister_one() {
        let hub = spawn_hub();
        let (s1, mut rx1) = new_session(8);
        let (s2, mut rx2) = new_session(8);
        let (s3, mut rx3) = new_session(8);
        for session in [&s1, &s2, &s3] {
            hub.register(Arc::clone(session)).await.unwrap();
        }

        hub.publish_new_comment(comment("c1"));
        hub.active_count().await.unwrap();

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            let Event::NewComment(view) = events[0].as_ref() else {
                panic!("expected new_comment, got {:?}", events[0]);
            };
            assert_eq!(view.id, "c1");
        }

        hub.unregister(Arc::clone(&s2)).await.unwrap();
        hub.publish_new_comment(comment("c2"));

        assert_eq!(hub.active_count().await.unwrap(), 2);
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx3).len(), 1);
        // Unregistered session gets nothing and its mailbox is closed
        assert!(rx2.try_recv().is_err());
        assert!(rx2.recv().await.is_none());
        hub.cancel();
    }

    #[tokio::test]
    async fn test_full_mailbox_sheds_session_exactly_once() {
        let hub = spawn_hub();
        let (slow, _slow_rx) = new_session(4);
        let (fast, mut fast_rx) = new_session(64);
        hub.register(Arc::clone(&slow)).await.unwrap();
        hub.register(Arc::clone(&fast)).await.unwrap();
        let before = hub.active_count().await.unwrap();

        // N > capacity, slow consumer never drains
        for i in 0..10 {
            hub.publish(Event::Error(format!("burst-{i}")));
        }

        assert_eq!(hub.active_count().await.unwrap(), before - 1);
        assert_eq!(slow.mailbox_close_count(), 1);
        assert!(!slow.is_mailbox_open());
        assert_eq!(hub.metrics().sessions_shed(), 1);
        assert_eq!(hub.metrics().mailbox_closes(), 1);

        // The fast session is unaffected
        assert_eq!(drain(&mut fast_rx).len(), 10);

        // A late unregister from the shed session's pumps is harmless
        hub.unregister(Arc::clone(&slow)).await.unwrap();
        assert_eq!(slow.mailbox_close_count(), 1);
        assert_eq!(hub.active_count().await.unwrap(), before - 1);
        hub.cancel();
    }

    #[tokio::test]
    async fn test_gone_consumer_removed_without_shedding() {
        let hub = spawn_hub();
        let (session, rx) = new_session(4);
        hub.register(Arc::clone(&session)).await.unwrap();
        drop(rx);

        hub.publish(Event::Error("anyone?".to_string()));

        assert_eq!(hub.active_count().await.unwrap(), 0);
        assert_eq!(hub.metrics().sessions_shed(), 0);
        assert_eq!(session.mailbox_close_count(), 1);
        hub.cancel();
    }

    #[tokio::test]
    async fn test_publish_drops_when_hub_queue_full() {
        // Current-thread runtime: the actor cannot run until this test yields
        let hub = HubHandle::spawn(HubConfig { queue_capacity: 1 }, HubMetrics::new());

        hub.publish(Event::Error("queued".to_string()));
        hub.publish(Event::Error("dropped".to_string()));

        assert_eq!(hub.metrics().events_dropped(), 1);
        hub.active_count().await.unwrap();
        assert_eq!(hub.metrics().events_published(), 1);
        hub.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_closes_mailboxes_and_rejects_requests() {
        let hub = spawn_hub();
        let (session, mut rx) = new_session(4);
        hub.register(Arc::clone(&session)).await.unwrap();

        hub.shutdown().await.unwrap();

        assert!(rx.recv().await.is_none());
        assert_eq!(session.mailbox_close_count(), 1);
        assert_eq!(hub.metrics().active_sessions(), 0);

        // Give the actor a moment to drop its receiver
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!hub.is_running());

        let (late, _late_rx) = new_session(4);
        assert_eq!(hub.register(late).await, Err(HubError::Unavailable));
        assert_eq!(hub.active_count().await, Err(HubError::Unavailable));

        hub.publish(Event::Error("after shutdown".to_string()));
        assert_eq!(hub.metrics().events_dropped(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_and_drain_waits_for_sessions_to_close() {
        let hub = spawn_hub();
        let (session, mut rx) = new_session(4);
        session.mark_open();
        hub.register(Arc::clone(&session)).await.unwrap();

        // Stand-in for the pumps: finish once the mailbox closes
        let pumps = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                while rx.recv().await.is_some() {}
                tokio::time::sleep(Duration::from_millis(20)).await;
                session.abort("mailbox closed");
            }
        });

        let lingering = hub.shutdown_and_drain(Duration::from_secs(5)).await.unwrap();

        assert_eq!(lingering, 0);
        assert_eq!(session.state(), SessionState::Closed);
        pumps.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_and_drain_gives_up_after_grace() {
        let hub = spawn_hub();
        let (stuck, _rx) = new_session(4);
        stuck.mark_open();
        hub.register(Arc::clone(&stuck)).await.unwrap();

        let started = tokio::time::Instant::now();
        let lingering = hub
            .shutdown_and_drain(Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(lingering, 1);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(stuck.mailbox_close_count(), 1);
        assert_eq!(
            hub.shutdown_and_drain(Duration::from_millis(100)).await,
            Err(HubError::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_actor() {
        let hub = spawn_hub();
        let (session, _rx) = new_session(4);
        hub.register(Arc::clone(&session)).await.unwrap();

        hub.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!hub.is_running());
        assert_eq!(session.mailbox_close_count(), 1);
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_publishers_behind_trait_object() {
        let hub = spawn_hub();
        let (session, mut rx) = new_session(4);
        hub.register(session).await.unwrap();

        let publishers: Vec<Arc<dyn EventPublisher>> =
            vec![Arc::new(hub.clone()), Arc::new(NoopPublisher)];
        for publisher in &publishers {
            publisher.publish_new_post(PostView {
                id: "p1".to_string(),
                title: "Title".to_string(),
                content: "Body".to_string(),
                author_id: None,
            });
        }
        hub.active_count().await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].as_ref(), Event::NewPost(p) if p.id == "p1"));
        hub.cancel();
    }
}
