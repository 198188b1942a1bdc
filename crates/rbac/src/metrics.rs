use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for the per-message pipeline in [`crate::interceptor`], grouped
/// the way `eisenbahn::broker::BrokerMetrics` groups its `AtomicU64` fields.
#[derive(Debug, Default)]
pub struct RbacMetrics {
    pub messages_processed: AtomicU64,
    pub messages_rejected: AtomicU64,
    pub messages_forwarded: AtomicU64,
    pub messages_validated: AtomicU64,
    pub queue_overflows: AtomicU64,
    pub validation_timeouts: AtomicU64,
}

/// Point-in-time snapshot, suitable for publishing or logging.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RbacMetricsSnapshot {
    pub messages_processed: u64,
    pub messages_rejected: u64,
    pub messages_forwarded: u64,
    pub messages_validated: u64,
    pub queue_overflows: u64,
    pub validation_timeouts: u64,
}

impl RbacMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_forwarded(&self) {
        self.messages_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_validated(&self) {
        self.messages_validated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queue_overflows(&self) {
        self.queue_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_validation_timeouts(&self) {
        self.validation_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RbacMetricsSnapshot {
        RbacMetricsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            messages_forwarded: self.messages_forwarded.load(Ordering::Relaxed),
            messages_validated: self.messages_validated.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            validation_timeouts: self.validation_timeouts.load(Ordering::Relaxed),
        }
    }
}
