//! Hot-tier entry metadata.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where an entry is known to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// In memory only.
    Hot,
    /// In memory and known to also exist on disk.
    Warm,
}

/// Target tier for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheLevel {
    /// Write into the hot tier, evicting as needed.
    #[default]
    Memory,
    /// Write the disk blob only; the hot tier is not populated.
    Disk,
}

/// A value in the hot tier together with its accounting metadata.
#[derive(Debug, Clone)]
pub(crate) struct HotEntry {
    pub(crate) value: Arc<Vec<u8>>,
    pub(crate) size: usize,
    pub(crate) created: Instant,
    pub(crate) last_access: Instant,
    pub(crate) access_count: u64,
    /// `None` means the entry never expires by time.
    pub(crate) ttl: Option<Duration>,
    pub(crate) tier: Tier,
}

impl HotEntry {
    pub(crate) fn new(
        value: Arc<Vec<u8>>,
        ttl: Option<Duration>,
        tier: Tier,
        now: Instant,
    ) -> Self {
        let size = value.len();
        Self {
            value,
            size,
            created: now,
            last_access: now,
            access_count: 0,
            ttl,
            tier,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.created) > ttl,
            None => false,
        }
    }

    /// Updates access bookkeeping on a hit.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_access = now;
        self.access_count += 1;
    }

    /// Remaining fraction of the TTL in `0.0..=1.0`; 1.0 for entries
    /// without one.
    pub(crate) fn ttl_slack(&self, now: Instant) -> f64 {
        match self.ttl {
            Some(ttl) if !ttl.is_zero() => {
                let age = now.saturating_duration_since(self.created);
                let remaining = ttl.saturating_sub(age);
                (remaining.as_secs_f64() / ttl.as_secs_f64()).min(1.0)
            }
            _ => 1.0,
        }
    }
}
