//! Injectable time source.
//!
//! The pipeline and cache never call `Instant::now()` directly; they go
//! through a [`Clock`] so that TTL expiry, adaptive eviction scoring, and
//! duration accounting can be driven deterministically in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic time source.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Returns wall-clock milliseconds since the unix epoch.
    ///
    /// Used only where a timestamp must survive process restart (disk blob
    /// headers); everything in-process is driven off [`Clock::now`].
    fn system_time_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// The default clock, backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only advances when told to.
///
/// Intended for tests: anchor once, then [`ManualClock::advance`] to move
/// entries past their TTL without sleeping.
#[derive(Clone)]
pub struct ManualClock {
    anchor: Instant,
    offset_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a manual clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.offset_ms
            .fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.anchor + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}
