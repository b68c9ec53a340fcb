//! Message types for hub communication.
//!
//! All requests reach the hub through one bounded `tokio::sync::mpsc` queue.
//! Request-reply commands carry a `tokio::sync::oneshot` sender.

use super::hub::SessionSnapshot;
use super::session::Session;
use crate::events::Event;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Messages sent to `HubActor`.
#[derive(Debug)]
pub enum HubMessage {
    /// Add a session to the registry. No-op if already present.
    Register {
        session: Arc<Session>,
        /// Acknowledged once the registry has been updated.
        respond_to: oneshot::Sender<()>,
    },

    /// Remove a session and close its mailbox. No-op if absent.
    Unregister {
        session: Arc<Session>,
        respond_to: oneshot::Sender<()>,
    },

    /// Deliver an event to every registered session (fire-and-forget).
    Publish { event: Arc<Event> },

    /// Current registry size.
    ActiveCount { respond_to: oneshot::Sender<usize> },

    /// Who is currently registered.
    Sessions {
        respond_to: oneshot::Sender<Vec<SessionSnapshot>>,
    },

    /// Close every mailbox and stop the actor. Replies with the sessions
    /// that were still registered.
    Shutdown {
        respond_to: oneshot::Sender<Vec<Arc<Session>>>,
    },
}
