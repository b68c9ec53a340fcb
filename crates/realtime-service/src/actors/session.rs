//! Session - one subscriber's duplex connection bridged to the hub.
//!
//! A `Session` is shared as `Arc<Session>` between the hub registry and the
//! session's two pumps:
//!
//! - **Inbound pump** reads client frames. Every frame refreshes the read
//!   deadline; a close frame, read error, end of stream or deadline expiry
//!   ends the session.
//! - **Outbound pump** drains the mailbox onto the wire, coalescing whatever
//!   is already queued into one newline-delimited text frame, and sends a
//!   keepalive ping every `ping_period`. Mailbox close (by the hub) or a
//!   failed write ends the session.
//!
//! # State Machine
//!
//! ```text
//! Connecting -> Open -> Closing -> Closed
//! ```
//!
//! `Closing` is entered by the first fatal condition in either pump; only that
//! caller asks the hub to unregister. `Closed` is entered when both pumps have
//! exited.
//!
//! The mailbox sender lives inside the session so the hub can close it. Taking
//! it out of its slot is the only close path, which makes closing idempotent.

use super::hub::HubHandle;
use crate::events::{encode_batch, Event, InboundEnvelope};
use crate::observability::metrics as prom;
use axum::extract::ws::Message;
use common::types::{SessionId, SubscriberId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Default read deadline.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Default write deadline.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Default maximum inbound frame size in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 512;

/// Shortest keepalive interval; `tokio::time::interval` rejects zero.
const MIN_PING_PERIOD: Duration = Duration::from_millis(1);

/// Number of pumps per session; the session is `Closed` once all have exited.
const PUMP_COUNT: u8 = 2;

/// Receiving half of a session mailbox, consumed by the outbound pump.
pub type MailboxReceiver = mpsc::Receiver<Arc<Event>>;

/// Deadlines and limits applied by the session pumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Read deadline; the session ends if nothing arrives for this long.
    pub pong_wait: Duration,
    /// Keepalive interval, 9/10 of `pong_wait`.
    pub ping_period: Duration,
    /// Deadline for every frame write.
    pub write_wait: Duration,
    /// Largest inbound frame accepted.
    pub max_message_bytes: usize,
}

impl SessionTimings {
    /// `ping_period` is never shorter than 1 ms, even for a zero `pong_wait`.
    #[must_use]
    pub fn new(pong_wait: Duration, write_wait: Duration, max_message_bytes: usize) -> Self {
        Self {
            pong_wait,
            ping_period: (pong_wait * 9 / 10).max(MIN_PING_PERIOD),
            write_wait,
            max_message_bytes,
        }
    }
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self::new(
            DEFAULT_PONG_WAIT,
            DEFAULT_WRITE_WAIT,
            DEFAULT_MAX_MESSAGE_BYTES,
        )
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

/// Result of a non-blocking mailbox delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Mailbox at capacity; the consumer is too slow.
    Full,
    /// Mailbox already closed or its consumer is gone.
    Closed,
}

/// One subscriber connection as seen by the hub and the pumps.
pub struct Session {
    id: SessionId,
    subscriber: Option<SubscriberId>,
    mailbox: Mutex<Option<mpsc::Sender<Arc<Event>>>>,
    mailbox_capacity: usize,
    state: AtomicU8,
    mailbox_closes: AtomicU32,
    /// Wakes the sibling pump once `Closing` is entered.
    close_token: CancellationToken,
    running_pumps: AtomicU8,
    created_at: Instant,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("subscriber", &self.subscriber)
            .field("state", &self.state())
            .field("mailbox_capacity", &self.mailbox_capacity)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session in `Connecting` state with a mailbox of `capacity`.
    ///
    /// A zero capacity is raised to 1.
    #[must_use]
    pub fn new(
        id: SessionId,
        subscriber: Option<SubscriberId>,
        capacity: usize,
    ) -> (Arc<Self>, MailboxReceiver) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        let session = Arc::new(Self {
            id,
            subscriber,
            mailbox: Mutex::new(Some(sender)),
            mailbox_capacity: capacity,
            state: AtomicU8::new(SessionState::Connecting as u8),
            mailbox_closes: AtomicU32::new(0),
            close_token: CancellationToken::new(),
            running_pumps: AtomicU8::new(PUMP_COUNT),
            created_at: Instant::now(),
        });

        (session, receiver)
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn subscriber(&self) -> Option<&SubscriberId> {
        self.subscriber.as_ref()
    }

    fn subscriber_label(&self) -> &str {
        self.subscriber
            .as_ref()
            .map_or("anonymous", SubscriberId::as_str)
    }

    #[must_use]
    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_capacity
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// How many times the mailbox has been closed. Never more than 1.
    #[must_use]
    pub fn mailbox_close_count(&self) -> u32 {
        self.mailbox_closes.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_mailbox_open(&self) -> bool {
        self.mailbox.lock().is_some()
    }

    /// Enqueue an event without waiting.
    pub(crate) fn try_deliver(&self, event: Arc<Event>) -> Delivery {
        let slot = self.mailbox.lock();
        let Some(sender) = slot.as_ref() else {
            return Delivery::Closed;
        };

        match sender.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Close the mailbox. Returns `true` only for the call that closed it.
    ///
    /// Events already queued stay readable by the outbound pump.
    pub(crate) fn close_mailbox(&self) -> bool {
        if self.mailbox.lock().take().is_some() {
            self.mailbox_closes.fetch_add(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    /// `Connecting -> Open`. Returns `false` if the session already left
    /// `Connecting`.
    pub fn mark_open(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Connecting as u8,
                SessionState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Enter `Closing`. Returns `true` only for the first caller.
    pub fn begin_close(&self, reason: &str) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= SessionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.close_token.cancel();
        info!(
            target: "rt.session",
            session_id = %self.id,
            subscriber_id = %self.subscriber_label(),
            reason = reason,
            "Session closing"
        );
        true
    }

    /// Close a session whose pumps were never started.
    pub fn abort(&self, reason: &str) {
        self.begin_close(reason);
        self.close_mailbox();
        self.enter_closed();
    }

    fn pump_exited(&self) {
        if self.running_pumps.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.enter_closed();
        }
    }

    fn enter_closed(&self) {
        let previous = self
            .state
            .swap(SessionState::Closed as u8, Ordering::AcqRel);
        if previous == SessionState::Closed as u8 {
            return;
        }

        let lifetime = self.created_at.elapsed();
        prom::record_session_duration(lifetime);
        info!(
            target: "rt.session",
            session_id = %self.id,
            subscriber_id = %self.subscriber_label(),
            duration_ms = u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX),
            "Session closed"
        );
    }
}

/// Enter `Closing` and, if this caller won, ask the hub to unregister.
async fn close_and_unregister(session: &Arc<Session>, hub: &HubHandle, reason: &'static str) {
    if !session.begin_close(reason) {
        return;
    }

    if let Err(e) = hub.unregister(Arc::clone(session)).await {
        debug!(
            target: "rt.session",
            session_id = %session.id,
            error = %e,
            "Hub unavailable while unregistering session"
        );
    }
}

/// Read client frames until the connection ends or goes quiet.
#[instrument(skip_all, name = "rt.session.inbound", fields(session_id = %session.id))]
pub async fn run_inbound_pump<S, E>(
    session: Arc<Session>,
    hub: HubHandle,
    mut stream: S,
    timings: SessionTimings,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    debug!(
        target: "rt.session",
        session_id = %session.id,
        subscriber_id = %session.subscriber_label(),
        "Inbound pump started"
    );

    let close_token = session.close_token.clone();

    let reason = loop {
        let read = tokio::select! {
            () = close_token.cancelled() => break None,
            read = timeout(timings.pong_wait, stream.next()) => read,
        };

        match read {
            Err(_) => break Some("read deadline expired"),
            Ok(None) => break Some("connection ended"),
            Ok(Some(Err(e))) => {
                debug!(
                    target: "rt.session",
                    session_id = %session.id,
                    error = %e,
                    "Read failed"
                );
                break Some("read error");
            }
            Ok(Some(Ok(message))) => {
                if let ControlFlow::Break(reason) = handle_inbound(&session, message, &timings) {
                    break Some(reason);
                }
            }
        }
    };

    if let Some(reason) = reason {
        close_and_unregister(&session, &hub, reason).await;
    }

    debug!(
        target: "rt.session",
        session_id = %session.id,
        "Inbound pump stopped"
    );
    session.pump_exited();
}

fn handle_inbound(
    session: &Session,
    message: Message,
    timings: &SessionTimings,
) -> ControlFlow<&'static str> {
    match message {
        Message::Text(text) => {
            if text.len() > timings.max_message_bytes {
                warn_oversized(session, text.len(), timings.max_message_bytes);
                return ControlFlow::Continue(());
            }
            match InboundEnvelope::parse(&text) {
                Ok(envelope) => debug!(
                    target: "rt.session",
                    session_id = %session.id,
                    kind = %envelope.kind,
                    "Ignoring client message"
                ),
                Err(e) => warn!(
                    target: "rt.session",
                    session_id = %session.id,
                    error = %e,
                    "Dropping malformed client frame"
                ),
            }
        }
        Message::Binary(data) => {
            if data.len() > timings.max_message_bytes {
                warn_oversized(session, data.len(), timings.max_message_bytes);
            } else {
                debug!(
                    target: "rt.session",
                    session_id = %session.id,
                    size = data.len(),
                    "Ignoring binary frame"
                );
            }
        }
        Message::Ping(_) | Message::Pong(_) => {
            trace!(target: "rt.session", session_id = %session.id, "Keepalive received");
        }
        Message::Close(_) => return ControlFlow::Break("peer closed connection"),
    }

    ControlFlow::Continue(())
}

fn warn_oversized(session: &Session, size: usize, limit: usize) {
    warn!(
        target: "rt.session",
        session_id = %session.id,
        size = size,
        limit = limit,
        "Dropping oversized client frame"
    );
}

/// Why the outbound loop stopped.
enum OutboundExit {
    /// Sibling pump entered `Closing`.
    Cancelled,
    /// Hub closed the mailbox and the backlog has been written.
    MailboxClosed,
    WriteFailed(&'static str),
}

/// Drain the mailbox onto the wire and keep the connection alive.
#[instrument(skip_all, name = "rt.session.outbound", fields(session_id = %session.id))]
pub async fn run_outbound_pump<K>(
    session: Arc<Session>,
    hub: HubHandle,
    mut sink: K,
    mut mailbox: MailboxReceiver,
    timings: SessionTimings,
) where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    debug!(
        target: "rt.session",
        session_id = %session.id,
        subscriber_id = %session.subscriber_label(),
        "Outbound pump started"
    );

    let close_token = session.close_token.clone();
    let batch_limit = session.mailbox_capacity;

    let mut keepalive = tokio::time::interval(timings.ping_period.max(MIN_PING_PERIOD));
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    keepalive.tick().await;

    let exit = loop {
        tokio::select! {
            biased;

            () = close_token.cancelled() => break OutboundExit::Cancelled,

            next = mailbox.recv() => {
                let Some(first) = next else {
                    break OutboundExit::MailboxClosed;
                };

                let mut batch = vec![first];
                while batch.len() < batch_limit {
                    match mailbox.try_recv() {
                        Ok(event) => batch.push(event),
                        Err(_) => break,
                    }
                }

                let frame = encode_batch(&batch);
                if frame.is_empty() {
                    continue;
                }

                trace!(
                    target: "rt.session",
                    session_id = %session.id,
                    events = batch.len(),
                    bytes = frame.len(),
                    "Writing batch"
                );

                if let Err(reason) = write_frame(&session, &mut sink, Message::Text(frame), timings.write_wait).await {
                    break OutboundExit::WriteFailed(reason);
                }
            }

            _ = keepalive.tick() => {
                if let Err(reason) = write_frame(&session, &mut sink, Message::Ping(Vec::new()), timings.write_wait).await {
                    break OutboundExit::WriteFailed(reason);
                }
            }
        }
    };

    match exit {
        OutboundExit::Cancelled => {
            send_close_frame(&session, &mut sink, timings.write_wait).await;
        }
        OutboundExit::MailboxClosed => {
            let won = session.begin_close("mailbox closed");
            send_close_frame(&session, &mut sink, timings.write_wait).await;
            if won {
                if let Err(e) = hub.unregister(Arc::clone(&session)).await {
                    debug!(
                        target: "rt.session",
                        session_id = %session.id,
                        error = %e,
                        "Hub unavailable while unregistering session"
                    );
                }
            }
        }
        OutboundExit::WriteFailed(reason) => {
            close_and_unregister(&session, &hub, reason).await;
        }
    }

    debug!(
        target: "rt.session",
        session_id = %session.id,
        "Outbound pump stopped"
    );
    session.pump_exited();
}

async fn write_frame<K>(
    session: &Session,
    sink: &mut K,
    message: Message,
    write_wait: Duration,
) -> Result<(), &'static str>
where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    match timeout(write_wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(
                target: "rt.session",
                session_id = %session.id,
                error = %e,
                "Write failed"
            );
            Err("write error")
        }
        Err(_) => Err("write deadline expired"),
    }
}

/// Best-effort close frame, bounded by the write deadline.
async fn send_close_frame<K>(session: &Session, sink: &mut K, write_wait: Duration)
where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    if let Err(reason) = write_frame(session, sink, Message::Close(None), write_wait).await {
        trace!(
            target: "rt.session",
            session_id = %session.id,
            reason = reason,
            "Close frame not sent"
        );
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
    use crate::actors::{HubConfig, HubMetrics};
    use futures::channel::mpsc as fmpsc;

    fn hub() -> HubHandle {
        HubHandle::spawn(HubConfig::default(), HubMetrics::new())
    }

    fn timings() -> SessionTimings {
        SessionTimings::new(Duration::from_secs(10), Duration::from_secs(1), 64)
    }

    fn error_event(text: &str) -> Arc<Event> {
        Arc::new(Event::Error(text.to_string()))
    }

    /// Yield until `condition` holds; panics after many rounds.
    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_ping_period_is_nine_tenths_of_pong_wait() {
        let defaults = SessionTimings::default();
        assert_eq!(defaults.pong_wait, Duration::from_secs(60));
        assert_eq!(defaults.ping_period, Duration::from_secs(54));
        assert_eq!(defaults.write_wait, Duration::from_secs(10));
        assert_eq!(defaults.max_message_bytes, 512);

        let short = SessionTimings::new(Duration::from_secs(1), Duration::from_secs(1), 1);
        assert_eq!(short.ping_period, Duration::from_millis(900));
        assert!(short.ping_period < short.pong_wait);
    }

    #[test]
    fn test_zero_pong_wait_keeps_positive_ping_period() {
        let timings = SessionTimings::new(Duration::ZERO, Duration::from_secs(1), 64);
        assert_eq!(timings.ping_period, MIN_PING_PERIOD);
    }

    #[test]
    fn test_state_transitions() {
        let (session, _rx) = Session::new(SessionId::new(), None, 4);
        assert_eq!(session.state(), SessionState::Connecting);

        assert!(session.mark_open());
        assert_eq!(session.state(), SessionState::Open);
        assert!(!session.mark_open());

        assert!(session.begin_close("test"));
        assert_eq!(session.state(), SessionState::Closing);
        assert!(!session.begin_close("again"));
        assert!(!session.mark_open());
    }

    #[test]
    fn test_abort_goes_straight_to_closed() {
        let (session, _rx) = Session::new(SessionId::new(), None, 4);

        session.abort("registration failed");

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.mailbox_close_count(), 1);
        assert!(!session.begin_close("late"));
    }

    #[test]
    fn test_close_mailbox_is_idempotent() {
        let (session, _rx) = Session::new(SessionId::new(), None, 4);

        assert!(session.close_mailbox());
        assert!(!session.close_mailbox());
        assert_eq!(session.mailbox_close_count(), 1);
        assert!(!session.is_mailbox_open());
    }

    #[test]
    fn test_try_deliver_reports_full_and_closed() {
        let (session, rx) = Session::new(SessionId::new(), None, 2);

        assert_eq!(session.try_deliver(error_event("a")), Delivery::Delivered);
        assert_eq!(session.try_deliver(error_event("b")), Delivery::Delivered);
        assert_eq!(session.try_deliver(error_event("c")), Delivery::Full);

        drop(rx);
        assert_eq!(session.try_deliver(error_event("d")), Delivery::Closed);

        session.close_mailbox();
        assert_eq!(session.try_deliver(error_event("e")), Delivery::Closed);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let (session, _rx) = Session::new(SessionId::new(), None, 0);
        assert_eq!(session.mailbox_capacity(), 1);
        assert_eq!(session.try_deliver(error_event("a")), Delivery::Delivered);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_begin_close_has_single_winner() {
        for _ in 0..50 {
            let (session, _rx) = Session::new(SessionId::new(), None, 4);
            session.mark_open();

            let a = tokio::spawn({
                let session = Arc::clone(&session);
                async move { session.begin_close("inbound") }
            });
            let b = tokio::spawn({
                let session = Arc::clone(&session);
                async move { session.begin_close("outbound") }
            });

            let winners = [a.await.unwrap(), b.await.unwrap()]
                .iter()
                .filter(|won| **won)
                .count();
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test]
    async fn test_outbound_coalesces_queued_events_into_one_frame() {
        let hub = hub();
        let (session, mailbox) = Session::new(SessionId::new(), None, 8);
        for text in ["one", "two", "three"] {
            session.try_deliver(error_event(text));
        }

        let (sink, mut wire) = fmpsc::unbounded::<Message>();
        tokio::spawn(run_outbound_pump(
            Arc::clone(&session),
            hub,
            sink,
            mailbox,
            timings(),
        ));

        let Some(Message::Text(frame)) = wire.next().await else {
            panic!("expected a text frame");
        };
        let lines: Vec<&str> = frame.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("one"));
        assert!(lines[2].contains("three"));
    }

    #[tokio::test]
    async fn test_outbound_batch_never_exceeds_capacity() {
        let hub = hub();
        let (session, mailbox) = Session::new(SessionId::new(), None, 2);
        session.try_deliver(error_event("a"));
        session.try_deliver(error_event("b"));

        let (sink, mut wire) = fmpsc::unbounded::<Message>();
        tokio::spawn(run_outbound_pump(
            Arc::clone(&session),
            hub,
            sink,
            mailbox,
            timings(),
        ));

        let Some(Message::Text(first)) = wire.next().await else {
            panic!("expected a text frame");
        };
        assert_eq!(first.split('\n').count(), 2);

        session.try_deliver(error_event("c"));
        let Some(Message::Text(second)) = wire.next().await else {
            panic!("expected a text frame");
        };
        assert_eq!(second.split('\n').count(), 1);
        assert!(second.contains("\"c\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_sends_keepalive_ping_each_period() {
        let hub = hub();
        let (session, mailbox) = Session::new(SessionId::new(), None, 4);

        let (sink, mut wire) = fmpsc::unbounded::<Message>();
        tokio::spawn(run_outbound_pump(
            Arc::clone(&session),
            hub,
            sink,
            mailbox,
            timings(),
        ));

        let started = Instant::now();
        assert!(matches!(wire.next().await, Some(Message::Ping(_))));
        assert!(started.elapsed() >= Duration::from_secs(9));

        assert!(matches!(wire.next().await, Some(Message::Ping(_))));
        assert!(started.elapsed() >= Duration::from_secs(18));
    }

    #[tokio::test]
    async fn test_outbound_drains_backlog_then_closes_when_hub_closes_mailbox() {
        let hub = hub();
        let (session, mailbox) = Session::new(SessionId::new(), None, 4);
        session.mark_open();
        session.try_deliver(error_event("last words"));
        session.close_mailbox();

        let (sink, mut wire) = fmpsc::unbounded::<Message>();
        run_outbound_pump(Arc::clone(&session), hub, sink, mailbox, timings()).await;

        assert!(matches!(wire.next().await, Some(Message::Text(t)) if t.contains("last words")));
        assert!(matches!(wire.next().await, Some(Message::Close(None))));
        assert_eq!(session.state(), SessionState::Closing);
        assert_eq!(session.mailbox_close_count(), 1);
    }

    #[tokio::test]
    async fn test_outbound_zero_ping_period_runs_and_reaches_closing() {
        let hub = hub();
        let (session, mailbox) = Session::new(SessionId::new(), None, 4);
        session.mark_open();
        session.try_deliver(error_event("only"));
        session.close_mailbox();

        // Struct literal bypasses the clamp in `SessionTimings::new`
        let zero = SessionTimings {
            ping_period: Duration::ZERO,
            ..SessionTimings::new(Duration::ZERO, Duration::from_secs(1), 64)
        };

        let (sink, mut wire) = fmpsc::unbounded::<Message>();
        let pump = tokio::spawn(run_outbound_pump(
            Arc::clone(&session),
            hub,
            sink,
            mailbox,
            zero,
        ));

        pump.await.expect("outbound pump must not panic");
        assert!(matches!(wire.next().await, Some(Message::Text(t)) if t.contains("only")));
        assert_eq!(session.state(), SessionState::Closing);
        assert_eq!(session.mailbox_close_count(), 1);
    }

    #[tokio::test]
    async fn test_outbound_write_failure_closes_session() {
        let hub = hub();
        let metrics = Arc::clone(hub.metrics());
        let (session, mailbox) = Session::new(SessionId::new(), None, 4);
        hub.register(Arc::clone(&session)).await.unwrap();
        session.mark_open();

        let (sink, wire) = fmpsc::unbounded::<Message>();
        drop(wire);
        session.try_deliver(error_event("nobody listening"));

        run_outbound_pump(Arc::clone(&session), hub.clone(), sink, mailbox, timings()).await;

        assert_eq!(session.state(), SessionState::Closing);
        assert_eq!(hub.active_count().await.unwrap(), 0);
        assert_eq!(session.mailbox_close_count(), 1);
        assert_eq!(metrics.mailbox_closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_deadline_expiry_unregisters_session() {
        let hub = hub();
        let (session, _mailbox) = Session::new(SessionId::new(), None, 4);
        hub.register(Arc::clone(&session)).await.unwrap();
        session.mark_open();

        let silent = futures::stream::pending::<Result<Message, String>>();
        let started = Instant::now();
        run_inbound_pump(Arc::clone(&session), hub.clone(), silent, timings()).await;

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(session.state(), SessionState::Closing);
        assert_eq!(hub.active_count().await.unwrap(), 0);
        assert!(!session.is_mailbox_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_frames_refresh_deadline() {
        let hub = hub();
        let (session, _mailbox) = Session::new(SessionId::new(), None, 4);
        session.mark_open();

        let (frames, stream) = fmpsc::unbounded::<Result<Message, String>>();
        let pump = tokio::spawn(run_inbound_pump(
            Arc::clone(&session),
            hub,
            stream,
            timings(),
        ));

        // Three pongs 8s apart keep a 10s deadline alive for 24s
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(8)).await;
            frames.unbounded_send(Ok(Message::Pong(Vec::new()))).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.state(), SessionState::Open);

        pump.abort();
    }

    #[tokio::test]
    async fn test_inbound_malformed_and_oversized_frames_keep_session_open() {
        let hub = hub();
        let (session, _mailbox) = Session::new(SessionId::new(), None, 4);
        session.mark_open();

        let (frames, stream) = fmpsc::unbounded::<Result<Message, String>>();
        frames
            .unbounded_send(Ok(Message::Text("{not json".to_string())))
            .unwrap();
        frames
            .unbounded_send(Ok(Message::Text("x".repeat(65))))
            .unwrap();
        frames
            .unbounded_send(Ok(Message::Binary(vec![0u8; 128])))
            .unwrap();
        frames
            .unbounded_send(Ok(Message::Text(r#"{"type":"hello"}"#.to_string())))
            .unwrap();

        let pump = tokio::spawn(run_inbound_pump(
            Arc::clone(&session),
            hub,
            stream,
            timings(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.state(), SessionState::Open);

        frames.unbounded_send(Ok(Message::Close(None))).unwrap();
        pump.await.unwrap();
        assert_eq!(session.state(), SessionState::Closing);
    }

    #[tokio::test]
    async fn test_inbound_read_error_closes_session() {
        let hub = hub();
        let (session, _mailbox) = Session::new(SessionId::new(), None, 4);
        session.mark_open();

        let (frames, stream) = fmpsc::unbounded::<Result<Message, String>>();
        frames
            .unbounded_send(Err("connection reset".to_string()))
            .unwrap();

        run_inbound_pump(Arc::clone(&session), hub, stream, timings()).await;
        assert_eq!(session.state(), SessionState::Closing);
    }

    #[tokio::test]
    async fn test_both_pumps_failing_together_close_mailbox_once() {
        let hub = hub();
        let metrics = Arc::clone(hub.metrics());

        for _ in 0..20 {
            let (session, mailbox) = Session::new(SessionId::new(), None, 4);
            hub.register(Arc::clone(&session)).await.unwrap();
            session.mark_open();

            // Inbound: stream ends. Outbound: peer gone, so the first write fails.
            let (frames, stream) = fmpsc::unbounded::<Result<Message, String>>();
            drop(frames);
            let (sink, wire) = fmpsc::unbounded::<Message>();
            drop(wire);
            session.try_deliver(error_event("x"));

            let inbound = tokio::spawn(run_inbound_pump(
                Arc::clone(&session),
                hub.clone(),
                stream,
                timings(),
            ));
            let outbound = tokio::spawn(run_outbound_pump(
                Arc::clone(&session),
                hub.clone(),
                sink,
                mailbox,
                timings(),
            ));
            inbound.await.unwrap();
            outbound.await.unwrap();

            wait_for(|| session.state() == SessionState::Closed).await;
            assert_eq!(session.mailbox_close_count(), 1);
        }

        assert_eq!(hub.active_count().await.unwrap(), 0);
        assert_eq!(metrics.mailbox_closes(), 20);
    }

    #[tokio::test]
    async fn test_sibling_pump_stops_when_other_side_closes() {
        let hub = hub();
        let (session, mailbox) = Session::new(SessionId::new(), None, 4);
        hub.register(Arc::clone(&session)).await.unwrap();
        session.mark_open();

        let (frames, stream) = fmpsc::unbounded::<Result<Message, String>>();
        let (sink, mut wire) = fmpsc::unbounded::<Message>();

        let outbound = tokio::spawn(run_outbound_pump(
            Arc::clone(&session),
            hub.clone(),
            sink,
            mailbox,
            timings(),
        ));
        let inbound = tokio::spawn(run_inbound_pump(
            Arc::clone(&session),
            hub.clone(),
            stream,
            timings(),
        ));

        frames.unbounded_send(Ok(Message::Close(None))).unwrap();
        inbound.await.unwrap();
        outbound.await.unwrap();

        assert!(matches!(wire.next().await, Some(Message::Close(None))));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(hub.active_count().await.unwrap(), 0);
        assert_eq!(session.mailbox_close_count(), 1);
    }
}
