//! Connection upgrade gateway.
//!
//! `GET /ws` upgrades to a WebSocket, builds a [`Session`](crate::actors::Session),
//! queues the `Connection` acknowledgement, registers the session with the hub
//! and launches its two pumps.
//!
//! A bearer token is never required. When one is presented and verifies, the
//! [`attach_subscriber_identity`] middleware tags the session with the
//! subscriber's user ID; otherwise the session is anonymous.

mod handler;
mod identity;

pub use handler::{serve_session, ws_upgrade};
pub use identity::{attach_subscriber_identity, SubscriberIdentity};
