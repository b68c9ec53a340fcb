//! Actor model for the realtime broadcast hub.
//!
//! ```text
//! HubActor (one per process, owns the subscriber registry)
//! └── N Sessions (one per WebSocket connection)
//!     ├── inbound pump  (reads frames, enforces the read deadline)
//!     └── outbound pump (drains the mailbox, sends keepalive pings)
//! ```
//!
//! - **Single writer**: only `HubActor` mutates the registry; everyone else
//!   talks to it through `HubHandle`
//! - **Bounded everywhere**: the hub command queue and every session mailbox
//!   are bounded; a full mailbox sheds its session
//! - **Self-unregistration**: the first fatal condition in either pump asks
//!   the hub to remove the session
//!
//! # Modules
//!
//! - [`hub`] - Hub actor, `HubHandle` and the `EventPublisher` seam
//! - [`session`] - `Session` state machine and its two pumps
//! - [`messages`] - Hub command types
//! - [`metrics`] - Hub counters and command queue monitoring

pub mod hub;
pub mod messages;
pub mod metrics;
pub mod session;

pub use hub::{EventPublisher, HubConfig, HubHandle, NoopPublisher, SessionSnapshot};
pub use messages::HubMessage;
pub use self::metrics::{HubMetrics, MailboxLevel, MailboxMonitor};
pub use session::{
    run_inbound_pump, run_outbound_pump, Delivery, MailboxReceiver, Session, SessionState,
    SessionTimings,
};
