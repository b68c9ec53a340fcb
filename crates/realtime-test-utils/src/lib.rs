//! # Realtime Test Utilities
//!
//! Shared test utilities for the realtime service.
//!
//! This crate provides:
//! - Server test harness (`TestRealtimeServer` for E2E tests)
//! - WebSocket test client (`WsTestClient`)
//! - Subscriber token builder (`TestTokenBuilder`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use realtime_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestRealtimeServer::spawn().await?;
//!     let mut client = WsTestClient::connect(&server.ws_url()).await?;
//!
//!     let ack = client.next_events(Duration::from_secs(1)).await?;
//!     assert_eq!(ack[0]["type"], "connection");
//!     Ok(())
//! }
//! ```

pub mod server_harness;
pub mod token_builder;
pub mod ws_client;

pub use server_harness::TestRealtimeServer;
pub use token_builder::{TestTokenBuilder, TEST_JWT_SECRET};
pub use ws_client::WsTestClient;
