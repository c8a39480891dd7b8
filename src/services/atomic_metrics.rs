use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pool-wide request counters, shared by every handle of one pool.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    executed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn get_succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn get_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn get_timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executed: self.get_executed(),
            succeeded: self.get_succeeded(),
            failed: self.get_failed(),
            timed_out: self.get_timed_out(),
        }
    }
}
