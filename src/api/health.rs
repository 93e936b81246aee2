//! Shared health state for the /api/health endpoint.
//! Updated by the index writer and refresh jobs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared health metrics. Updated by background components, read by the API.
#[derive(Default)]
pub struct HealthState {
    /// True while writes to the analytics store are succeeding.
    pub analytics_connected: AtomicBool,
    /// Nanosecond timestamp of the last completed prediction refresh (0 = none).
    pub last_refresh_at_ns: AtomicU64,
    /// Approximate count of documents queued for the index writer.
    pub write_queue_pending: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_analytics_connected(&self, v: bool) {
        self.analytics_connected.store(v, Ordering::Relaxed);
    }

    pub fn set_last_refresh_at_ns(&self, ns: u64) {
        self.last_refresh_at_ns.store(ns, Ordering::Relaxed);
    }

    pub fn inc_write_queue_pending(&self) {
        self.write_queue_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_write_queue_pending(&self) {
        self.write_queue_pending.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn analytics_connected(&self) -> bool {
        self.analytics_connected.load(Ordering::Relaxed)
    }

    pub fn last_refresh_at_ns(&self) -> u64 {
        self.last_refresh_at_ns.load(Ordering::Relaxed)
    }

    pub fn write_queue_pending(&self) -> u64 {
        self.write_queue_pending.load(Ordering::Relaxed)
    }
}
