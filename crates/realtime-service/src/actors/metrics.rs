//! Hub metrics and command queue monitoring.
//!
//! `HubMetrics` keeps lock-free counters that tests and the readiness path can
//! read directly, and forwards every change to the Prometheus facade in
//! [`crate::observability::metrics`].
//!
//! `MailboxMonitor` watches the hub command queue depth:
//!
//! | Level    | Depth (fraction of capacity) |
//! |----------|------------------------------|
//! | Normal   | <= 1/2                       |
//! | Warning  | 1/2 - 9/10                   |
//! | Critical | > 9/10                       |

use crate::events::EventKind;
use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Queue depth monitor for an actor's command mailbox.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Actor name for log fields and metric labels.
    actor: &'static str,
    normal_threshold: usize,
    warning_threshold: usize,
    /// Depth observed at the last dequeue.
    depth: AtomicUsize,
    /// Peak depth since last reset.
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
    /// Last level logged, so crossings are reported once.
    last_level: parking_lot::Mutex<MailboxLevel>,
}

impl MailboxMonitor {
    /// Create a monitor whose thresholds scale with the queue capacity.
    #[must_use]
    pub fn for_capacity(actor: &'static str, capacity: usize) -> Self {
        let normal_threshold = (capacity / 2).max(1);
        let warning_threshold = (capacity.saturating_mul(9) / 10).max(normal_threshold);

        Self {
            actor,
            normal_threshold,
            warning_threshold,
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
            last_level: parking_lot::Mutex::new(MailboxLevel::Normal),
        }
    }

    /// Record the queue depth observed when a message is taken off the queue.
    pub fn record_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
        prom::set_actor_queue_depth(self.actor, depth);

        let level = self.level_for_depth(depth);
        let mut last = self.last_level.lock();
        if level == *last {
            return;
        }

        match level {
            MailboxLevel::Critical => warn!(
                target: "rt.hub",
                actor = self.actor,
                depth = depth,
                threshold = self.warning_threshold,
                "Command queue depth critical"
            ),
            MailboxLevel::Warning => debug!(
                target: "rt.hub",
                actor = self.actor,
                depth = depth,
                threshold = self.normal_threshold,
                "Command queue depth elevated"
            ),
            MailboxLevel::Normal => debug!(
                target: "rt.hub",
                actor = self.actor,
                depth = depth,
                "Command queue depth back to normal"
            ),
        }
        *last = level;
    }

    /// Record a message as processed.
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.warning_threshold {
            MailboxLevel::Critical
        } else if depth > self.normal_threshold {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Counters for the hub and its sessions.
///
/// Shared between the hub actor (writer) and health/metrics readers.
#[derive(Debug, Default)]
pub struct HubMetrics {
    active_sessions: AtomicUsize,
    registrations: AtomicU64,
    /// Every mailbox close, whatever the cause.
    mailbox_closes: AtomicU64,
    sessions_shed: AtomicU64,
    events_published: AtomicU64,
    events_dropped: AtomicU64,
}

impl HubMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn session_registered(&self, active: usize) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        self.set_active(active);
        prom::record_session_registered();
    }

    pub(crate) fn session_removed(&self, active: usize) {
        self.set_active(active);
    }

    pub(crate) fn mailbox_closed(&self) {
        self.mailbox_closes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_shed(&self) {
        self.sessions_shed.fetch_add(1, Ordering::Relaxed);
        prom::record_session_shed();
    }

    pub(crate) fn event_published(&self, kind: EventKind) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        prom::record_event_published(kind.as_str());
    }

    pub(crate) fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
        prom::record_event_dropped();
    }

    fn set_active(&self, active: usize) {
        self.active_sessions.store(active, Ordering::Relaxed);
        prom::set_sessions_active(active);
    }

    /// Advisory, lock-free snapshot of the registry size.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn mailbox_closes(&self) -> u64 {
        self.mailbox_closes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sessions_shed(&self) -> u64 {
        self.sessions_shed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}
