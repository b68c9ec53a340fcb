//! Observability for the realtime service.
//!
//! # Logging
//!
//! `tracing` with structured fields. Targets:
//! - `rt.hub` - registry changes, shedding, dropped publishes
//! - `rt.session` - pump lifecycle, malformed or oversized client frames
//! - `rt.gateway` - upgrades and identity resolution
//!
//! Subscriber identities are logged; tokens and e-mail addresses never are.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `rt_sessions_active` | Gauge | none | Registered sessions |
//! | `rt_sessions_registered_total` | Counter | none | Registrations |
//! | `rt_sessions_shed_total` | Counter | none | Slow sessions dropped by the hub |
//! | `rt_events_published_total` | Counter | `kind` | Events fanned out |
//! | `rt_events_dropped_total` | Counter | none | Publishes rejected at the hub queue |
//! | `rt_session_duration_seconds` | Histogram | none | Session lifetime |
//! | `rt_actor_queue_depth` | Gauge | `actor` | Hub command queue backlog |

pub mod health;
pub mod metrics;

use crate::config::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use health::{health_router, HealthState};
pub use self::metrics::init_metrics_recorder;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "realtime_service=info,rt=info,tower_http=info";

/// Install the global tracing subscriber.
pub fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}
