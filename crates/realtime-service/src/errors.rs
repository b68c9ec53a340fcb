//! Realtime service error types.
//!
//! Transport failures inside the session pumps never surface here; they end
//! the affected session and are logged. These types cover the few places a
//! caller actually needs an answer: talking to the hub and opening a session.

use thiserror::Error;

/// Errors returned by [`HubHandle`](crate::actors::HubHandle) requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    /// The hub actor has stopped (shutdown or all handles dropped).
    #[error("hub is not running")]
    Unavailable,

    /// The hub accepted the request but dropped the reply channel.
    #[error("hub dropped the response")]
    ResponseDropped,
}

/// Errors raised while turning an upgraded connection into a session.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The session could not be registered with the hub.
    #[error("session registration failed: {0}")]
    Registration(#[from] HubError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_error_display() {
        assert_eq!(HubError::Unavailable.to_string(), "hub is not running");
        assert_eq!(
            HubError::ResponseDropped.to_string(),
            "hub dropped the response"
        );
    }

    #[test]
    fn test_gateway_error_from_hub_error() {
        let err: GatewayError = HubError::Unavailable.into();
        assert_eq!(
            err.to_string(),
            "session registration failed: hub is not running"
        );
    }
}
