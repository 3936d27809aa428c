//! Events emitted by the cache.

use batchline_core::Event;
use std::time::Instant;

/// Cache observability events.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A get was served from the hot tier or promoted from disk.
    Hit {
        source: String,
        timestamp: Instant,
        key: String,
    },
    /// A get found nothing usable in either tier.
    Miss {
        source: String,
        timestamp: Instant,
        key: String,
    },
    /// An entry was removed to honour the memory budget.
    Evicted {
        source: String,
        timestamp: Instant,
        key: String,
    },
    /// An evicted entry was written to disk instead of being dropped.
    Demoted {
        source: String,
        timestamp: Instant,
        key: String,
    },
    /// An entry passed its TTL and was swept.
    Expired {
        source: String,
        timestamp: Instant,
        key: String,
    },
    /// A prefetch producer populated the cache.
    Prefetched {
        source: String,
        timestamp: Instant,
        key: String,
    },
}

impl Event for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "cache_hit",
            CacheEvent::Miss { .. } => "cache_miss",
            CacheEvent::Evicted { .. } => "cache_evicted",
            CacheEvent::Demoted { .. } => "cache_demoted",
            CacheEvent::Expired { .. } => "cache_expired",
            CacheEvent::Prefetched { .. } => "cache_prefetched",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Evicted { timestamp, .. }
            | CacheEvent::Demoted { timestamp, .. }
            | CacheEvent::Expired { timestamp, .. }
            | CacheEvent::Prefetched { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            CacheEvent::Hit { source, .. }
            | CacheEvent::Miss { source, .. }
            | CacheEvent::Evicted { source, .. }
            | CacheEvent::Demoted { source, .. }
            | CacheEvent::Expired { source, .. }
            | CacheEvent::Prefetched { source, .. } => source,
        }
    }
}
