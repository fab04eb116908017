//! Multiplier metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Delivery metrics for a single multiplier
#[derive(Debug, Default)]
pub struct MultiplierMetrics {
    /// Currently connected subscribers
    subscribers: AtomicUsize,
    /// Input values broadcast
    round_count: AtomicU64,
    /// Successful per-subscriber deliveries
    delivered_count: AtomicU64,
    /// Per-subscriber values dropped on timeout
    timeout_count: AtomicU64,
    /// Sends that found the subscriber stream already closed
    closed_count: AtomicU64,
}

impl MultiplierMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get connected subscriber count
    pub fn subscribers(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Set connected subscriber count
    pub fn set_subscribers(&self, n: usize) {
        self.subscribers.store(n, Ordering::Relaxed);
    }

    /// Get round count
    pub fn round_count(&self) -> u64 {
        self.round_count.load(Ordering::Relaxed)
    }

    /// Increment round count
    pub fn inc_round_count(&self) {
        self.round_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get delivered count
    pub fn delivered_count(&self) -> u64 {
        self.delivered_count.load(Ordering::Relaxed)
    }

    /// Increment delivered count
    pub fn inc_delivered_count(&self) {
        self.delivered_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get timeout count
    pub fn timeout_count(&self) -> u64 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    /// Add to timeout count
    pub fn add_timeout_count(&self, n: u64) {
        self.timeout_count.fetch_add(n, Ordering::Relaxed);
    }

    /// Get closed-stream count
    pub fn closed_count(&self) -> u64 {
        self.closed_count.load(Ordering::Relaxed)
    }

    /// Increment closed-stream count
    pub fn inc_closed_count(&self) {
        self.closed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            subscribers: self.subscribers(),
            round_count: self.round_count(),
            delivered_count: self.delivered_count(),
            timeout_count: self.timeout_count(),
            closed_count: self.closed_count(),
        }
    }
}

/// Snapshot of multiplier metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub subscribers: usize,
    pub round_count: u64,
    pub delivered_count: u64,
    pub timeout_count: u64,
    pub closed_count: u64,
}
