//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for the token signing secret and any
//! other credential that passes through configuration. `SecretString` redacts
//! itself in `Debug`, so structs that derive `Debug` stay safe to log.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let signing_secret = SecretString::from("dev-only-secret");
//! assert!(format!("{signing_secret:?}").contains("REDACTED"));
//! assert_eq!(signing_secret.expose_secret(), "dev-only-secret");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("jwt-signing-key");
        assert_eq!(secret.expose_secret(), "jwt-signing-key");
    }

    #[test]
    fn test_deserialize_keeps_value_hidden() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct SigningSettings {
            issuer: String,
            secret: SecretString,
        }

        let json = r#"{"issuer": "blog-api", "secret": "my-secret-value"}"#;
        let settings: SigningSettings = serde_json::from_str(json).expect("deserialize");

        assert_eq!(settings.secret.expose_secret(), "my-secret-value");

        let debug = format!("{settings:?}");
        assert!(debug.contains("blog-api"));
        assert!(!debug.contains("my-secret-value"));
    }
}
