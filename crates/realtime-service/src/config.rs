//! Realtime service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use crate::actors::{HubConfig, SessionTimings};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default per-session mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default hub command queue capacity.
pub const DEFAULT_HUB_QUEUE_CAPACITY: usize = 1024;

/// Default read deadline in seconds.
pub const DEFAULT_PONG_WAIT_SECONDS: u64 = 60;

/// Default write deadline in seconds.
pub const DEFAULT_WRITE_WAIT_SECONDS: u64 = 10;

/// Default maximum inbound frame size in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 512;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Realtime service configuration.
#[derive(Clone)]
pub struct Config {
    /// Listener address for HTTP, WebSocket, health and metrics routes.
    pub bind_address: String,

    /// Bound of each session's outbound mailbox.
    pub mailbox_capacity: usize,

    /// Bound of the hub's command queue.
    pub hub_queue_capacity: usize,

    /// Read deadline; keepalive pings go out at 9/10 of this.
    pub pong_wait_seconds: u64,

    /// Deadline for every frame write.
    pub write_wait_seconds: u64,

    /// Largest inbound frame accepted from a client.
    pub max_message_bytes: usize,

    /// HS256 secret for optional subscriber identity. `None` disables it.
    pub jwt_secret: Option<SecretString>,

    pub log_format: LogFormat,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("hub_queue_capacity", &self.hub_queue_capacity)
            .field("pong_wait_seconds", &self.pong_wait_seconds)
            .field("write_wait_seconds", &self.write_wait_seconds)
            .field("max_message_bytes", &self.max_message_bytes)
            .field(
                "jwt_secret",
                &self.jwt_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            hub_queue_capacity: DEFAULT_HUB_QUEUE_CAPACITY,
            pong_wait_seconds: DEFAULT_PONG_WAIT_SECONDS,
            write_wait_seconds: DEFAULT_WRITE_WAIT_SECONDS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            jwt_secret: None,
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparseable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparseable or out-of-range values.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("RT_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let mailbox_capacity =
            parse_positive(vars, "RT_MAILBOX_CAPACITY", DEFAULT_MAILBOX_CAPACITY)?;
        let hub_queue_capacity =
            parse_positive(vars, "RT_HUB_QUEUE_CAPACITY", DEFAULT_HUB_QUEUE_CAPACITY)?;
        let pong_wait_seconds =
            parse_positive(vars, "RT_PONG_WAIT_SECONDS", DEFAULT_PONG_WAIT_SECONDS)?;
        let write_wait_seconds =
            parse_positive(vars, "RT_WRITE_WAIT_SECONDS", DEFAULT_WRITE_WAIT_SECONDS)?;
        let max_message_bytes =
            parse_positive(vars, "RT_MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES)?;

        // An empty secret would accept tokens signed with an empty key
        let jwt_secret = vars
            .get("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.clone()));

        let log_format = match vars.get("LOG_FORMAT").map(String::as_str) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )))
            }
        };

        Ok(Config {
            bind_address,
            mailbox_capacity,
            hub_queue_capacity,
            pong_wait_seconds,
            write_wait_seconds,
            max_message_bytes,
            jwt_secret,
            log_format,
        })
    }

    /// Session deadlines derived from this configuration.
    #[must_use]
    pub fn session_timings(&self) -> SessionTimings {
        SessionTimings::new(
            Duration::from_secs(self.pong_wait_seconds),
            Duration::from_secs(self.write_wait_seconds),
            self.max_message_bytes,
        )
    }

    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.hub_queue_capacity,
        }
    }
}

/// Parse an optional numeric variable that must be at least 1.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = raw.trim().parse().map_err(|_| {
        ConfigError::InvalidValue(format!("{name} must be a positive integer, got '{raw}'"))
    })?;

    if value < T::from(1) {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be at least 1, got '{raw}'"
        )));
    }

    Ok(value)
}
