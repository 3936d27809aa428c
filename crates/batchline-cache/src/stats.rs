//! Cache statistics: atomic counters snapshotted into a serialisable
//! struct.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Gets served from either tier.
    pub hits: u64,
    /// Gets that found nothing usable.
    pub misses: u64,
    /// Entries removed to honour the memory budget.
    pub evictions: u64,
    /// Entries swept or rejected because their TTL elapsed.
    pub expirations: u64,
    /// Evicted entries written to disk instead of dropped.
    pub demotions: u64,
    /// Values inserted by prefetch producers.
    pub prefetches: u64,
    /// Prefetch schedules suppressed by the recursion guard.
    pub prefetch_recursions: u64,
    /// Read-path backend faults demoted to misses.
    pub backend_errors: u64,
    /// Bytes currently charged against the hot-tier budget.
    pub bytes: u64,
    /// Entries currently in the hot tier.
    pub entry_count: usize,
    /// hits / (hits + misses), `0.0..=1.0`.
    pub hit_rate: f64,
    /// Exponentially weighted mean latency of the hit path, milliseconds.
    pub avg_hit_latency_ms: f64,
}

/// Shared counter block.
pub(crate) struct StatCounters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) expirations: AtomicU64,
    pub(crate) demotions: AtomicU64,
    pub(crate) prefetches: AtomicU64,
    pub(crate) prefetch_recursions: AtomicU64,
    pub(crate) backend_errors: AtomicU64,
    /// EWMA, 0.9 old / 0.1 new, in milliseconds.
    avg_hit_latency_ms: Mutex<f64>,
}

impl StatCounters {
    pub(crate) fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            demotions: AtomicU64::new(0),
            prefetches: AtomicU64::new(0),
            prefetch_recursions: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
            avg_hit_latency_ms: Mutex::new(0.0),
        }
    }

    pub(crate) fn record_hit_latency(&self, millis: f64) {
        let mut avg = self.avg_hit_latency_ms.lock().unwrap();
        *avg = if *avg == 0.0 {
            millis
        } else {
            *avg * 0.9 + millis * 0.1
        };
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.demotions.store(0, Ordering::Relaxed);
        self.prefetches.store(0, Ordering::Relaxed);
        self.prefetch_recursions.store(0, Ordering::Relaxed);
        self.backend_errors.store(0, Ordering::Relaxed);
        *self.avg_hit_latency_ms.lock().unwrap() = 0.0;
    }

    pub(crate) fn snapshot(&self, bytes: u64, entry_count: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
            prefetches: self.prefetches.load(Ordering::Relaxed),
            prefetch_recursions: self.prefetch_recursions.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            bytes,
            entry_count,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            avg_hit_latency_ms: *self.avg_hit_latency_ms.lock().unwrap(),
        }
    }
}

/// Detailed hot-tier memory breakdown.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryUsage {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub average_entry_size: u64,
    pub largest_entry_size: u64,
    pub smallest_entry_size: u64,
    pub budget_bytes: u64,
    /// total / budget as a percentage.
    pub usage_percent: f64,
}
