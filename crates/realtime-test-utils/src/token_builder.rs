//! Builder for subscriber bearer tokens.

use chrono::{Duration, Utc};
use common::jwt::SubscriberClaims;
use jsonwebtoken::{encode, EncodingKey, Header};

/// Signing secret used by test servers that enable bearer identity.
pub const TEST_JWT_SECRET: &str = "realtime-test-secret-do-not-use-in-production";

/// Builder for signed subscriber tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .expires_in(3600)
///     .sign(TEST_JWT_SECRET);
/// ```
pub struct TestTokenBuilder {
    user_id: String,
    username: String,
    email: String,
    exp: i64,
    iat: i64,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            user_id: "test-user".to_string(),
            username: "test-user".to_string(),
            email: "test-user@example.com".to_string(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Set the user ID (and username)
    pub fn for_user(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self.username = user_id.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Build the claims
    pub fn build(self) -> SubscriberClaims {
        SubscriberClaims {
            user_id: self.user_id,
            username: self.username,
            email: self.email,
            exp: self.exp,
            iat: self.iat,
        }
    }

    /// Build and sign the claims with HS256
    pub fn sign(self, secret: &str) -> String {
        encode(
            &Header::default(),
            &self.build(),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("HS256 signing with a byte secret cannot fail")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::jwt::SubscriberTokenValidator;
    use common::secret::SecretString;

    #[test]
    fn test_builder_creates_claims() {
        let claims = TestTokenBuilder::new().for_user("alice").build();

        assert_eq!(claims.user_id, "alice");
        assert_eq!(claims.username, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_signed_token_validates() {
        let token = TestTokenBuilder::new().for_user("bob").sign(TEST_JWT_SECRET);
        let validator =
            SubscriberTokenValidator::new(&SecretString::from(TEST_JWT_SECRET.to_string()));

        let claims = validator.validate(&token).unwrap();
        assert_eq!(claims.user_id, "bob");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = TestTokenBuilder::new()
            .expires_in(-3600)
            .issued_at(Utc::now().timestamp() - 7200)
            .sign(TEST_JWT_SECRET);
        let validator =
            SubscriberTokenValidator::new(&SecretString::from(TEST_JWT_SECRET.to_string()));

        assert!(validator.validate(&token).is_err());
    }
}
