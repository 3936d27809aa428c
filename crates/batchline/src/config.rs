//! Coordinator configuration: every runtime knob of the substrate in one
//! builder, fanned out to the pipeline and cache configs.

use batchline_cache::{CacheConfig, EvictionPolicy};
use batchline_core::{Clock, SystemClock};
use batchline_pipeline::PipelineConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`Coordinator`](crate::Coordinator).
pub struct CoordinatorConfig {
    pub(crate) name: String,
    pub(crate) max_workers: usize,
    pub(crate) max_concurrent: usize,
    pub(crate) default_timeout: Duration,
    pub(crate) max_retries: u32,
    pub(crate) cache_memory_budget: usize,
    pub(crate) default_ttl: Duration,
    pub(crate) eviction_policy: EvictionPolicy,
    pub(crate) disk_enabled: bool,
    pub(crate) disk_dir: PathBuf,
    pub(crate) compress_disk: bool,
    pub(crate) prefetch_enabled: bool,
    pub(crate) metrics_interval: Duration,
    pub(crate) clock: Arc<dyn Clock>,
}

impl CoordinatorConfig {
    /// Creates a new builder with default values.
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::new()
    }

    pub(crate) fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::builder()
            .name(format!("{}-pipeline", self.name))
            .max_workers(self.max_workers)
            .max_concurrent(self.max_concurrent)
            .default_timeout(self.default_timeout)
            .max_retries(self.max_retries)
            .metrics_interval(self.metrics_interval)
            .clock(Arc::clone(&self.clock))
            .build()
    }

    pub(crate) fn cache_config(&self) -> CacheConfig {
        CacheConfig::builder()
            .name(format!("{}-cache", self.name))
            .memory_budget(self.cache_memory_budget)
            .default_ttl(self.default_ttl)
            .eviction_policy(self.eviction_policy)
            .disk_enabled(self.disk_enabled)
            .disk_dir(self.disk_dir.clone())
            .compress_disk(self.compress_disk)
            .prefetch_enabled(self.prefetch_enabled)
            .clock(Arc::clone(&self.clock))
            .build()
    }
}

/// Builder for [`CoordinatorConfig`]. Defaults match the documented
/// contract of the substrate.
pub struct CoordinatorConfigBuilder {
    name: String,
    max_workers: usize,
    max_concurrent: usize,
    default_timeout: Duration,
    max_retries: u32,
    cache_memory_budget: usize,
    default_ttl: Duration,
    eviction_policy: EvictionPolicy,
    disk_enabled: bool,
    disk_dir: PathBuf,
    compress_disk: bool,
    prefetch_enabled: bool,
    metrics_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl CoordinatorConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("batchline"),
            max_workers: num_cpus::get() + 4,
            max_concurrent: 100,
            default_timeout: Duration::from_secs(30),
            max_retries: 3,
            cache_memory_budget: 512 * 1024 * 1024,
            default_ttl: Duration::from_secs(3600),
            eviction_policy: EvictionPolicy::Adaptive,
            disk_enabled: true,
            disk_dir: PathBuf::from(".cache"),
            compress_disk: true,
            prefetch_enabled: true,
            metrics_interval: Duration::from_secs(5),
            clock: Arc::new(SystemClock),
        }
    }

    /// Instance name used in logs and metric labels. Default: `batchline`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Worker pool size. Default: logical CPUs + 4.
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Cap on simultaneously running tasks. Default: 100.
    pub fn max_concurrent(mut self, concurrent: usize) -> Self {
        self.max_concurrent = concurrent;
        self
    }

    /// Per-task fallback timeout. Default: 30 s.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Per-task fallback retry budget. Default: 3.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Hot-tier byte cap. Default: 512 MiB.
    pub fn cache_memory_budget(mut self, bytes: usize) -> Self {
        self.cache_memory_budget = bytes;
        self
    }

    /// Entry TTL when a caller supplies none. Default: 3600 s.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Hot-tier eviction policy. Default: adaptive.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Enables the warm (disk) tier. Default: enabled.
    pub fn disk_enabled(mut self, enabled: bool) -> Self {
        self.disk_enabled = enabled;
        self
    }

    /// Disk blob directory. Default: `./.cache`.
    pub fn disk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = dir.into();
        self
    }

    /// gzip disk payloads. Default: enabled.
    pub fn compress_disk(mut self, compress: bool) -> Self {
        self.compress_disk = compress;
        self
    }

    /// Enables the background prefetcher. Default: enabled.
    pub fn prefetch_enabled(mut self, enabled: bool) -> Self {
        self.prefetch_enabled = enabled;
        self
    }

    /// Metrics sampling period. Default: 5 s.
    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }

    /// Replaces the time source for both engines.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CoordinatorConfig {
        CoordinatorConfig {
            name: self.name,
            max_workers: self.max_workers,
            max_concurrent: self.max_concurrent,
            default_timeout: self.default_timeout,
            max_retries: self.max_retries,
            cache_memory_budget: self.cache_memory_budget,
            default_ttl: self.default_ttl,
            eviction_policy: self.eviction_policy,
            disk_enabled: self.disk_enabled,
            disk_dir: self.disk_dir,
            compress_disk: self.compress_disk,
            prefetch_enabled: self.prefetch_enabled,
            metrics_interval: self.metrics_interval,
            clock: self.clock,
        }
    }
}

impl Default for CoordinatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
