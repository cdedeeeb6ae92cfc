//! Concurrency-safe per-pass counters, written from multiple workers and
//! read once after the batch's `JoinSet` drains — the "concurrency-safe
//! counter primitive" spec.md §9 calls for, as an alternative to a
//! reduce-after-join pattern.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PassMetrics {
    pub total_selected: AtomicU64,
    pub updated: AtomicU64,
    pub unchanged: AtomicU64,
    pub errored: AtomicU64,
}

/// A point-in-time read of [`PassMetrics`], logged once per pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassMetricsSnapshot {
    pub total_selected: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub errored: u64,
}

impl PassMetrics {
    pub fn snapshot(&self) -> PassMetricsSnapshot {
        PassMetricsSnapshot {
            total_selected: self.total_selected.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
        }
    }
}
