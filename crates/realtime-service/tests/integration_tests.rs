//! Integration tests for the realtime service
//!
//! This is the top-level integration test harness that Cargo discovers.
//! Test modules are organized in the integration/ subdirectory.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

#[path = "integration/fixtures.rs"]
mod fixtures;

#[path = "integration/broadcast_tests.rs"]
mod broadcast_tests;

#[path = "integration/liveness_tests.rs"]
mod liveness_tests;

#[path = "integration/shedding_tests.rs"]
mod shedding_tests;

#[path = "integration/identity_tests.rs"]
mod identity_tests;

#[path = "integration/health_tests.rs"]
mod health_tests;
