//! Configuration for the cache.

use crate::events::CacheEvent;
use crate::eviction::EvictionPolicy;
use batchline_core::{Clock, EventListeners, FnListener, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`Cache`](crate::Cache) instance.
pub struct CacheConfig {
    pub(crate) name: String,
    pub(crate) memory_budget: usize,
    pub(crate) default_ttl: Option<Duration>,
    pub(crate) policy: EvictionPolicy,
    pub(crate) disk_enabled: bool,
    pub(crate) disk_dir: PathBuf,
    pub(crate) compress_disk: bool,
    pub(crate) prefetch_enabled: bool,
    pub(crate) prefetch_queue_depth: usize,
    pub(crate) cleanup_interval: Duration,
    pub(crate) demote_access_threshold: u64,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl CacheConfig {
    /// Creates a new builder with default values.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder {
    name: String,
    memory_budget: usize,
    default_ttl: Option<Duration>,
    policy: EvictionPolicy,
    disk_enabled: bool,
    disk_dir: PathBuf,
    compress_disk: bool,
    prefetch_enabled: bool,
    prefetch_queue_depth: usize,
    cleanup_interval: Duration,
    demote_access_threshold: u64,
    event_listeners: EventListeners<CacheEvent>,
    clock: Arc<dyn Clock>,
}

impl CacheConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            memory_budget: 512 * 1024 * 1024,
            default_ttl: Some(Duration::from_secs(3600)),
            policy: EvictionPolicy::Adaptive,
            disk_enabled: true,
            disk_dir: PathBuf::from(".cache"),
            compress_disk: true,
            prefetch_enabled: true,
            prefetch_queue_depth: 256,
            cleanup_interval: Duration::from_secs(60),
            demote_access_threshold: 2,
            event_listeners: EventListeners::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the name of this cache instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the hot-tier byte budget.
    ///
    /// Default: 512 MiB
    pub fn memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes.max(1);
        self
    }

    /// Sets the TTL applied when a caller supplies none.
    /// `Duration::ZERO` disables the default (entries never expire).
    ///
    /// Default: 3600 seconds
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = if ttl.is_zero() { None } else { Some(ttl) };
        self
    }

    /// Selects the eviction policy.
    ///
    /// Default: [`EvictionPolicy::Adaptive`]
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enables or disables the warm (disk) tier.
    ///
    /// Default: enabled
    pub fn disk_enabled(mut self, enabled: bool) -> Self {
        self.disk_enabled = enabled;
        self
    }

    /// Sets the directory for disk blobs.
    ///
    /// Default: `./.cache`
    pub fn disk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = dir.into();
        self
    }

    /// Enables or disables gzip compression of disk payloads.
    ///
    /// Default: enabled
    pub fn compress_disk(mut self, compress: bool) -> Self {
        self.compress_disk = compress;
        self
    }

    /// Enables or disables the background prefetcher.
    ///
    /// Default: enabled
    pub fn prefetch_enabled(mut self, enabled: bool) -> Self {
        self.prefetch_enabled = enabled;
        self
    }

    /// Sets the bounded depth of the prefetch queue; requests beyond it
    /// are dropped.
    ///
    /// Default: 256
    pub fn prefetch_queue_depth(mut self, depth: usize) -> Self {
        self.prefetch_queue_depth = depth.max(1);
        self
    }

    /// Sets the period of the expiry-sweep ticker.
    ///
    /// Default: 60 seconds
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// An eviction candidate accessed more times than this is demoted to
    /// disk instead of dropped.
    ///
    /// Default: 2
    pub fn demote_access_threshold(mut self, threshold: u64) -> Self {
        self.demote_access_threshold = threshold;
        self
    }

    /// Replaces the time source; tests inject a
    /// [`ManualClock`](batchline_core::ManualClock) here.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers a raw event listener.
    pub fn listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Registers a callback for cache hits.
    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Hit { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for cache misses.
    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Miss { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for evictions.
    pub fn on_eviction<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Evicted { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CacheConfig {
        CacheConfig {
            name: self.name,
            memory_budget: self.memory_budget,
            default_ttl: self.default_ttl,
            policy: self.policy,
            disk_enabled: self.disk_enabled,
            disk_dir: self.disk_dir,
            compress_disk: self.compress_disk,
            prefetch_enabled: self.prefetch_enabled,
            prefetch_queue_depth: self.prefetch_queue_depth,
            cleanup_interval: self.cleanup_interval,
            demote_access_threshold: self.demote_access_threshold,
            event_listeners: self.event_listeners,
            clock: self.clock,
        }
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
