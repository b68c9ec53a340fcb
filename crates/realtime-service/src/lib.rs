//! Realtime Service Library
//!
//! Fans blog domain events (new posts, new comments) out to every connected
//! WebSocket subscriber.
//!
//! # Architecture
//!
//! ```text
//! publisher ──publish──> HubActor ──try_send──> Session mailbox (x N)
//!                            ^                        │
//!                            └──── unregister ────────┤
//!                                                     v
//!                                        outbound pump ──> WebSocket
//!                                        inbound pump  <── WebSocket
//! ```
//!
//! - Publishing never blocks: a subscriber whose mailbox is full is shed
//! - Every frame a session sends is one or more newline-separated JSON events
//! - Sessions that stop answering keepalive pings are closed after `pong_wait`
//!
//! # Modules
//!
//! - [`actors`] - Hub actor, sessions and their pumps
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types
//! - [`events`] - Event model and wire encoding
//! - [`gateway`] - `GET /ws` upgrade and optional subscriber identity
//! - [`observability`] - Tracing, metrics and health probes
//! - [`routes`] - Router and shared application state

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actors;
pub mod config;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod observability;
pub mod routes;
