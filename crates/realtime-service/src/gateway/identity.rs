//! Optional subscriber identity for upgrade requests.

use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use common::jwt::{SubscriberClaims, SubscriberTokenValidator};
use common::types::SubscriberId;
use tracing::{debug, instrument};

/// Subscriber resolved from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberIdentity {
    pub subscriber_id: SubscriberId,
    pub username: String,
}

impl From<SubscriberClaims> for SubscriberIdentity {
    fn from(claims: SubscriberClaims) -> Self {
        Self {
            subscriber_id: SubscriberId::from(claims.user_id),
            username: claims.username,
        }
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn resolve(validator: &SubscriberTokenValidator, token: &str) -> Option<SubscriberIdentity> {
    match validator.validate(token) {
        Ok(claims) => Some(SubscriberIdentity::from(claims)),
        Err(e) => {
            debug!(
                target: "rt.gateway",
                error = %e,
                "Bearer token rejected, continuing anonymously"
            );
            None
        }
    }
}

/// Insert a [`SubscriberIdentity`] into request extensions when the request
/// carries a valid `Authorization: Bearer` token.
///
/// Never rejects: a missing, malformed or invalid token (or no configured
/// signing secret) leaves the request anonymous.
#[instrument(skip_all, name = "rt.gateway.identity")]
pub async fn attach_subscriber_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = match (state.token_validator.as_deref(), bearer_token(&req)) {
        (Some(validator), Some(token)) => resolve(validator, token),
        _ => None,
    };

    if let Some(identity) = identity {
        debug!(
            target: "rt.gateway",
            subscriber_id = %identity.subscriber_id,
            "Subscriber identity attached"
        );
        req.extensions_mut().insert(identity);
    }

    next.run(req).await
}
