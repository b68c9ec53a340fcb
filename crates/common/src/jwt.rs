//! Subscriber bearer-token validation.
//!
//! The blog API issues HS256 JWTs carrying `user_id`, `username` and `email`.
//! The realtime gateway only needs to turn a presented token into an optional
//! subscriber identity, so this module provides:
//! - Size limits checked before any parsing
//! - Signature and `exp` verification with the shared signing secret
//! - `iat` validation with clock skew tolerance
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted
//! - Error messages are generic; details go to `debug` logs only
//! - `email` is redacted in `Debug` output

use crate::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical subscriber tokens are 200-400 bytes; anything larger is rejected
/// before base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during subscriber token validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token could not be decoded or its signature/expiry did not verify.
    #[error("The access token is invalid or expired")]
    InvalidToken,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Claims
// =============================================================================

/// Claims carried by a subscriber token.
#[derive(Clone, Serialize, Deserialize)]
pub struct SubscriberClaims {
    /// Platform user ID.
    pub user_id: String,

    /// Display name.
    pub username: String,

    /// E-mail address - redacted in Debug output.
    pub email: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
}

impl fmt::Debug for SubscriberClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberClaims")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("email", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Validates subscriber tokens against the shared HS256 signing secret.
pub struct SubscriberTokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    clock_skew: Duration,
}

impl fmt::Debug for SubscriberTokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberTokenValidator")
            .field("decoding_key", &"[REDACTED]")
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl SubscriberTokenValidator {
    /// Create a validator for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    /// Validate a raw bearer token and return its claims.
    ///
    /// # Errors
    ///
    /// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
    /// - `InvalidToken` - malformed, bad signature, wrong algorithm or expired
    /// - `IatTooFarInFuture` - `iat` beyond the clock skew tolerance
    pub fn validate(&self, token: &str) -> Result<SubscriberClaims, JwtValidationError> {
        if token.len() > MAX_JWT_SIZE_BYTES {
            tracing::debug!(
                target: "common.jwt",
                token_size = token.len(),
                max_size = MAX_JWT_SIZE_BYTES,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(JwtValidationError::TokenTooLarge);
        }

        let data = decode::<SubscriberClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(target: "common.jwt", error = %e, "Token rejected");
                JwtValidationError::InvalidToken
            })?;

        validate_iat(data.claims.iat, self.clock_skew)?;

        Ok(data.claims)
    }
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Clock skew is minutes at most, well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-signing-secret-for-subscribers";

    fn claims(exp_offset: i64, iat_offset: i64) -> SubscriberClaims {
        let now = chrono::Utc::now().timestamp();
        SubscriberClaims {
            user_id: "user-1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            exp: now + exp_offset,
            iat: now + iat_offset,
        }
    }

    fn sign(claims: &SubscriberClaims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn validator() -> SubscriberTokenValidator {
        SubscriberTokenValidator::new(&SecretString::from(SECRET))
    }

    #[test]
    fn test_valid_token_returns_claims() {
        let token = sign(&claims(3600, 0), SECRET);

        let claims = validator().validate(&token).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(&claims(3600, 0), "some-other-secret");

        let result = validator().validate(&token);
        assert_eq!(result.unwrap_err(), JwtValidationError::InvalidToken);
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = sign(&claims(-3600, -7200), SECRET);

        let result = validator().validate(&token);
        assert_eq!(result.unwrap_err(), JwtValidationError::InvalidToken);
    }

    #[test]
    fn test_garbage_token_rejected() {
        let result = validator().validate("not-a-jwt");
        assert_eq!(result.unwrap_err(), JwtValidationError::InvalidToken);
    }

    #[test]
    fn test_oversized_token_rejected_before_parsing() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let result = validator().validate(&oversized);
        assert_eq!(result.unwrap_err(), JwtValidationError::TokenTooLarge);
    }

    #[test]
    fn test_future_iat_rejected() {
        let token = sign(&claims(7200, 3600), SECRET);

        let result = validator().validate(&token);
        assert_eq!(result.unwrap_err(), JwtValidationError::IatTooFarInFuture);
    }

    #[test]
    fn test_iat_at_skew_boundary_accepted() {
        let now = 1_700_000_000;
        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());
        assert_eq!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        );
    }

    #[test]
    fn test_error_messages_are_generic() {
        let messages = [
            JwtValidationError::TokenTooLarge.to_string(),
            JwtValidationError::InvalidToken.to_string(),
            JwtValidationError::IatTooFarInFuture.to_string(),
        ];
        for message in messages {
            assert_eq!(message, "The access token is invalid or expired");
        }
    }

    #[test]
    fn test_claims_debug_redacts_email() {
        let debug = format!("{:?}", claims(60, 0));
        assert!(debug.contains("user-1"));
        assert!(!debug.contains("alice@example.com"));
        assert!(debug.contains("[REDACTED]"));
    }
}
