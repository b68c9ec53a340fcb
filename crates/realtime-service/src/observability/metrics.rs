//! Metrics definitions for the realtime service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rt_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `kind`: 4 values (bounded by `EventKind`)
//! - `actor`: 1 value today (`hub`)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Bucket boundaries for session lifetimes: sub-second failures up to
/// day-long tabs.
const SESSION_DURATION_BUCKETS: &[f64] = &[
    0.1, 1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0, 14_400.0, 86_400.0,
];

/// Build a Prometheus builder with the service's histogram buckets.
///
/// # Errors
///
/// Returns error if a bucket configuration is rejected.
pub fn prometheus_builder() -> Result<PrometheusBuilder, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("rt_session_duration_seconds".to_string()),
            SESSION_DURATION_BUCKETS,
        )
        .map_err(|e| format!("Failed to set session duration buckets: {e}"))
}

/// Initialize the global Prometheus recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    prometheus_builder()?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Metric: `rt_sessions_active` (gauge)
pub fn set_sessions_active(count: usize) {
    // usize to f64 conversion is safe for realistic session counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("rt_sessions_active").set(count as f64);
}

/// Metric: `rt_sessions_registered_total` (counter)
pub fn record_session_registered() {
    counter!("rt_sessions_registered_total").increment(1);
}

/// Metric: `rt_sessions_shed_total` (counter)
///
/// Sessions removed by the hub because their mailbox was full.
pub fn record_session_shed() {
    counter!("rt_sessions_shed_total").increment(1);
}

/// Metric: `rt_session_duration_seconds` (histogram)
pub fn record_session_duration(duration: Duration) {
    histogram!("rt_session_duration_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Event Metrics
// ============================================================================

/// Metric: `rt_events_published_total` (counter)
/// Labels: `kind` (connection, new_blog_post, new_comment, error)
pub fn record_event_published(kind: &'static str) {
    counter!("rt_events_published_total", "kind" => kind).increment(1);
}

/// Metric: `rt_events_dropped_total` (counter)
///
/// Publishes rejected because the hub command queue was full or the hub
/// had stopped.
pub fn record_event_dropped() {
    counter!("rt_events_dropped_total").increment(1);
}

// ============================================================================
// Actor Metrics
// ============================================================================

/// Metric: `rt_actor_queue_depth` (gauge)
/// Labels: `actor`
pub fn set_actor_queue_depth(actor: &'static str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rt_actor_queue_depth", "actor" => actor).set(depth as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Without an installed recorder these calls go to the no-op recorder;
    // they only need to not panic.
    #[test]
    fn test_recording_without_recorder_is_harmless() {
        set_sessions_active(0);
        set_sessions_active(10_000);
        record_session_registered();
        record_session_shed();
        record_session_duration(Duration::from_millis(1500));
        record_event_published("new_comment");
        record_event_dropped();
        set_actor_queue_depth("hub", 12);
    }

    #[test]
    fn test_metric_names_and_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_sessions_active(3);
            record_session_registered();
            record_session_shed();
            record_event_published("new_comment");
            record_event_published("new_comment");
            record_event_dropped();
            record_session_duration(Duration::from_secs(2));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let find = |name: &str| {
            snapshot
                .iter()
                .find(|(key, _, _, _)| key.key().name() == name)
                .map(|(key, _, _, value)| (key.key().clone(), value))
        };

        let (_, active) = find("rt_sessions_active").expect("gauge recorded");
        assert!(matches!(active, DebugValue::Gauge(v) if (v.into_inner() - 3.0).abs() < f64::EPSILON));

        let (published_key, published) =
            find("rt_events_published_total").expect("counter recorded");
        assert!(matches!(published, DebugValue::Counter(2)));
        assert!(published_key
            .labels()
            .any(|label| label.key() == "kind" && label.value() == "new_comment"));

        assert!(matches!(
            find("rt_sessions_shed_total").map(|(_, v)| v),
            Some(DebugValue::Counter(1))
        ));
        assert!(matches!(
            find("rt_events_dropped_total").map(|(_, v)| v),
            Some(DebugValue::Counter(1))
        ));
        assert!(matches!(
            find("rt_session_duration_seconds").map(|(_, v)| v),
            Some(DebugValue::Histogram(values)) if values.len() == 1
        ));
    }

    #[test]
    fn test_prometheus_builder_accepts_buckets() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let rendered = recorder.handle().render();
        assert!(rendered.is_empty() || rendered.contains("rt_"));
    }
}
