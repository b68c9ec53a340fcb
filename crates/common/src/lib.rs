//! Common utilities and types shared across the blog realtime components.

#![warn(clippy::pedantic)]

/// Module for identifier types (sessions, subscribers)
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for subscriber bearer-token validation
pub mod jwt;
