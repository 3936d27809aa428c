//! The two-tier cache facade.
//!
//! One mutex guards the hot-tier index and its byte counter; it is never
//! held across an await point. Disk reads are lock-free; disk writes take
//! a per-key lock inside the store. Background maintenance (expiry sweep,
//! prefetch drain) runs on dedicated tasks spawned by `start`.

use crate::config::CacheConfig;
use crate::disk::DiskStore;
use crate::entry::{CacheLevel, HotEntry, Tier};
use crate::error::CacheError;
use crate::events::CacheEvent;
use crate::eviction::select_victims;
use crate::prefetch::{PrefetchProducer, PrefetchState};
use crate::stats::{CacheStats, MemoryUsage, StatCounters};
use lru::LruCache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// How long `stop` waits for each background task before aborting it.
const JOIN_GRACE: Duration = Duration::from_secs(2);

/// Options for [`Cache::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// `None` applies the configured default TTL; `Duration::ZERO` means
    /// the entry never expires.
    pub ttl: Option<Duration>,
    /// Target tier for the write.
    pub level: CacheLevel,
}

impl SetOptions {
    /// Hot-tier write with an explicit TTL.
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            level: CacheLevel::Memory,
        }
    }

    /// Disk-only write with the default TTL.
    pub fn disk() -> Self {
        Self {
            ttl: None,
            level: CacheLevel::Disk,
        }
    }
}

struct HotTier {
    index: LruCache<String, HotEntry>,
    bytes: usize,
}

struct CacheShared {
    config: CacheConfig,
    hot: Mutex<HotTier>,
    disk: RwLock<Option<Arc<DiskStore>>>,
    stats: StatCounters,
    prefetch: PrefetchState,
    running: AtomicBool,
    shutdown: Notify,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Two-tier keyed byte cache: hot in-memory tier with byte-budget
/// eviction, warm disk tier, TTL expiry, and pattern-driven prefetch.
pub struct Cache {
    shared: Arc<CacheShared>,
}

impl Clone for Cache {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

enum HotLookup {
    Hit(Arc<Vec<u8>>),
    Expired,
    Absent,
}

impl Cache {
    /// Creates a cache from the given configuration. Call
    /// [`start`](Cache::start) before relying on the disk tier, expiry
    /// sweeps, or prefetch.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                config,
                hot: Mutex::new(HotTier {
                    index: LruCache::unbounded(),
                    bytes: 0,
                }),
                disk: RwLock::new(None),
                stats: StatCounters::new(),
                prefetch: PrefetchState::new(),
                running: AtomicBool::new(false),
                shutdown: Notify::new(),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Opens the disk store (replaying its index journal) and spawns the
    /// cleanup and prefetch workers. An unwritable disk directory fails
    /// here rather than on first use. Idempotent.
    pub async fn start(&self) -> Result<(), CacheError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let config = &self.shared.config;
        tracing::info!(
            cache = %config.name,
            budget = config.memory_budget,
            policy = ?config.policy,
            disk = config.disk_enabled,
            "starting cache"
        );

        if config.disk_enabled {
            let store = match DiskStore::open(
                config.disk_dir.clone(),
                config.compress_disk,
                Arc::clone(&config.clock),
            )
            .await
            {
                Ok(store) => store,
                Err(e) => {
                    self.shared.running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            };
            *self.shared.disk.write().unwrap() = Some(Arc::new(store));
        }

        let mut handles = self.shared.handles.lock().unwrap();
        handles.push(tokio::spawn(cleanup_loop(self.clone())));
        if config.prefetch_enabled {
            let (tx, rx) = mpsc::channel(config.prefetch_queue_depth);
            self.shared.prefetch.attach(tx);
            handles.push(tokio::spawn(prefetch_loop(self.clone(), rx)));
        }
        Ok(())
    }

    /// Stops background workers and writes the disk index journal.
    /// Idempotent.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(cache = %self.shared.config.name, "stopping cache");
        self.shared.prefetch.detach();
        self.shared.shutdown.notify_waiters();

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.shared.handles.lock().unwrap());
        for mut handle in handles {
            if tokio::time::timeout(JOIN_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        let disk = self.shared.disk.write().unwrap().take();
        if let Some(disk) = disk {
            if let Err(e) = disk.close().await {
                tracing::warn!(cache = %self.shared.config.name, error = %e, "failed to write disk cache index");
            }
        }
    }

    /// Returns true if the cache has been started.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Looks up a key: hot tier first, then promotion from disk. A true
    /// miss schedules any matching prefetch patterns, fire-and-forget.
    /// Backend faults are demoted to misses and counted.
    pub async fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let shared = &self.shared;
        let start = shared.config.clock.now();

        let lookup = {
            let mut hot = shared.hot.lock().unwrap();
            let decision = match hot.index.get_mut(key) {
                Some(entry) if entry.is_expired(start) => HotLookup::Expired,
                Some(entry) => {
                    entry.touch(start);
                    HotLookup::Hit(Arc::clone(&entry.value))
                }
                None => HotLookup::Absent,
            };
            if matches!(decision, HotLookup::Expired) {
                if let Some(old) = hot.index.pop(key) {
                    hot.bytes -= old.size;
                }
            }
            decision
        };

        match lookup {
            HotLookup::Hit(value) => {
                self.record_hit(key, start);
                return Some(value);
            }
            HotLookup::Expired => {
                shared.stats.expirations.fetch_add(1, Ordering::Relaxed);
                self.emit(CacheEvent::Expired {
                    source: shared.config.name.clone(),
                    timestamp: start,
                    key: key.to_string(),
                });
            }
            HotLookup::Absent => {}
        }

        if let Some(disk) = self.disk_store() {
            match disk.get(key).await {
                Ok(Some(value)) => {
                    let value = Arc::new(value);
                    let promoted = self
                        .insert_hot(
                            key,
                            Arc::clone(&value),
                            shared.config.default_ttl,
                            Tier::Warm,
                        )
                        .await;
                    if let Err(e) = promoted {
                        tracing::warn!(cache = %shared.config.name, key, error = %e, "failed to promote disk entry");
                    }
                    self.record_hit(key, start);
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => {
                    shared.stats.backend_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(cache = %shared.config.name, key, error = %e, "disk read failed, treating as miss");
                }
            }
        }

        shared.stats.misses.fetch_add(1, Ordering::Relaxed);
        self.emit(CacheEvent::Miss {
            source: shared.config.name.clone(),
            timestamp: shared.config.clock.now(),
            key: key.to_string(),
        });
        #[cfg(feature = "metrics")]
        counter!("batchline_cache_misses_total", "cache" => shared.config.name.clone())
            .increment(1);

        self.maybe_schedule_prefetch(key);
        None
    }

    /// Writes a value. `CacheLevel::Memory` evicts as needed to honour the
    /// byte budget before returning; `CacheLevel::Disk` writes the blob
    /// only. Overwrites any prior entry at the same key.
    pub async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        opts: SetOptions,
    ) -> Result<(), CacheError> {
        let ttl = self.resolve_ttl(opts.ttl);
        match opts.level {
            CacheLevel::Memory => {
                self.insert_hot(key, Arc::new(value), ttl, Tier::Hot).await
            }
            CacheLevel::Disk => {
                if !self.shared.config.disk_enabled {
                    return Err(CacheError::DiskDisabled);
                }
                let disk = self.disk_store().ok_or(CacheError::NotRunning)?;
                disk.put(key, &value, ttl).await
            }
        }
    }

    /// Removes a key from both tiers.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        {
            let mut hot = self.shared.hot.lock().unwrap();
            if let Some(entry) = hot.index.pop(key) {
                hot.bytes -= entry.size;
            }
        }
        if let Some(disk) = self.disk_store() {
            disk.remove(key).await?;
        }
        Ok(())
    }

    /// Empties both tiers and resets the statistics.
    pub async fn clear(&self) -> Result<(), CacheError> {
        {
            let mut hot = self.shared.hot.lock().unwrap();
            hot.index.clear();
            hot.bytes = 0;
        }
        self.shared.stats.reset();
        if let Some(disk) = self.disk_store() {
            disk.clear().await?;
        }
        Ok(())
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let (bytes, entry_count) = {
            let hot = self.shared.hot.lock().unwrap();
            (hot.bytes as u64, hot.index.len())
        };
        self.shared.stats.snapshot(bytes, entry_count)
    }

    /// Detailed hot-tier memory breakdown.
    pub fn memory_usage(&self) -> MemoryUsage {
        let hot = self.shared.hot.lock().unwrap();
        let sizes: Vec<u64> = hot.index.iter().map(|(_, e)| e.size as u64).collect();
        let total: u64 = sizes.iter().sum();
        let budget = self.shared.config.memory_budget as u64;
        MemoryUsage {
            total_entries: sizes.len(),
            total_size_bytes: total,
            average_entry_size: if sizes.is_empty() {
                0
            } else {
                total / sizes.len() as u64
            },
            largest_entry_size: sizes.iter().copied().max().unwrap_or(0),
            smallest_entry_size: sizes.iter().copied().min().unwrap_or(0),
            budget_bytes: budget,
            usage_percent: if budget > 0 {
                total as f64 / budget as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// Registers a prefetch pattern. On a miss whose key starts with
    /// `prefix`, `producer` runs in the background and its value (if any)
    /// is inserted via `set`. Multiple matching patterns fire in
    /// registration order until one returns a value.
    pub fn register_prefetch<F, Fut>(&self, prefix: impl Into<String>, producer: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Option<Vec<u8>>, batchline_core::BoxError>>
            + Send
            + 'static,
    {
        let producer: PrefetchProducer = Arc::new(move |key| Box::pin(producer(key)));
        self.shared.prefetch.register(prefix.into(), producer);
    }

    fn resolve_ttl(&self, requested: Option<Duration>) -> Option<Duration> {
        match requested {
            None => self.shared.config.default_ttl,
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
        }
    }

    fn disk_store(&self) -> Option<Arc<DiskStore>> {
        self.shared.disk.read().unwrap().clone()
    }

    fn emit(&self, event: CacheEvent) {
        self.shared.config.event_listeners.emit(&event);
    }

    fn record_hit(&self, key: &str, start: std::time::Instant) {
        let shared = &self.shared;
        shared.stats.hits.fetch_add(1, Ordering::Relaxed);
        let now = shared.config.clock.now();
        let latency_ms = now.saturating_duration_since(start).as_secs_f64() * 1000.0;
        shared.stats.record_hit_latency(latency_ms);
        self.emit(CacheEvent::Hit {
            source: shared.config.name.clone(),
            timestamp: now,
            key: key.to_string(),
        });
        #[cfg(feature = "metrics")]
        counter!("batchline_cache_hits_total", "cache" => shared.config.name.clone()).increment(1);
    }

    /// Inserts into the hot tier, evicting first so the byte budget holds
    /// when this returns. Victims with enough access history are demoted
    /// to disk with their remaining TTL.
    async fn insert_hot(
        &self,
        key: &str,
        value: Arc<Vec<u8>>,
        ttl: Option<Duration>,
        tier: Tier,
    ) -> Result<(), CacheError> {
        let shared = &self.shared;
        let now = shared.config.clock.now();
        let size = value.len();
        let budget = shared.config.memory_budget;

        if size > budget {
            // Cannot fit even an empty hot tier; keep the budget invariant
            // and fall back to the disk tier.
            tracing::warn!(
                cache = %shared.config.name,
                key,
                size,
                budget,
                "value exceeds hot-tier budget, storing on disk only"
            );
            if let Some(disk) = self.disk_store() {
                disk.put(key, &value, ttl).await?;
            }
            return Ok(());
        }

        let mut evicted: Vec<String> = Vec::new();
        let mut demotions: Vec<(String, HotEntry)> = Vec::new();
        {
            let mut hot = shared.hot.lock().unwrap();
            if let Some(old) = hot.index.pop(key) {
                hot.bytes -= old.size;
            }
            let needed = (hot.bytes + size).saturating_sub(budget);
            if needed > 0 {
                let victims = select_victims(&hot.index, shared.config.policy, needed, now);
                for victim in victims {
                    if let Some(entry) = hot.index.pop(&victim) {
                        hot.bytes -= entry.size;
                        shared.stats.evictions.fetch_add(1, Ordering::Relaxed);
                        if shared.config.disk_enabled
                            && entry.access_count > shared.config.demote_access_threshold
                            && !entry.is_expired(now)
                        {
                            demotions.push((victim.clone(), entry));
                        }
                        evicted.push(victim);
                    }
                }
            }
            hot.index
                .put(key.to_string(), HotEntry::new(value, ttl, tier, now));
            hot.bytes += size;
        }

        for victim in &evicted {
            self.emit(CacheEvent::Evicted {
                source: shared.config.name.clone(),
                timestamp: now,
                key: victim.clone(),
            });
        }
        #[cfg(feature = "metrics")]
        if !evicted.is_empty() {
            counter!("batchline_cache_evictions_total", "cache" => shared.config.name.clone())
                .increment(evicted.len() as u64);
        }

        if let Some(disk) = self.disk_store() {
            for (victim, entry) in demotions {
                // Preserve the remaining lifetime; a demotion must not
                // extend the entry's expiry.
                let remaining = entry.ttl.map(|ttl| {
                    ttl.saturating_sub(now.saturating_duration_since(entry.created))
                });
                if matches!(remaining, Some(d) if d.is_zero()) {
                    continue;
                }
                match disk.put(&victim, &entry.value, remaining).await {
                    Ok(()) => {
                        shared.stats.demotions.fetch_add(1, Ordering::Relaxed);
                        self.emit(CacheEvent::Demoted {
                            source: shared.config.name.clone(),
                            timestamp: now,
                            key: victim,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(cache = %shared.config.name, key = %victim, error = %e, "demotion write failed");
                    }
                }
            }
        }
        Ok(())
    }

    fn maybe_schedule_prefetch(&self, key: &str) {
        let shared = &self.shared;
        if !shared.config.prefetch_enabled || !shared.prefetch.has_patterns() {
            return;
        }
        if shared.prefetch.matching(key).is_empty() {
            return;
        }
        if shared.prefetch.is_recursive(key) {
            shared
                .stats
                .prefetch_recursions
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache = %shared.config.name, key, "prefetch recursion suppressed");
            return;
        }
        shared.prefetch.schedule(key);
    }

    /// True when the key is present and unexpired in the hot tier, without
    /// promoting it.
    fn contains_fresh(&self, key: &str) -> bool {
        let now = self.shared.config.clock.now();
        let hot = self.shared.hot.lock().unwrap();
        hot.index
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Sweeps expired hot entries; returns how many were removed.
    fn sweep_expired(&self) -> usize {
        let shared = &self.shared;
        let now = shared.config.clock.now();
        let expired: Vec<String> = {
            let mut hot = shared.hot.lock().unwrap();
            let keys: Vec<String> = hot
                .index
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                if let Some(entry) = hot.index.pop(key) {
                    hot.bytes -= entry.size;
                }
            }
            keys
        };
        shared
            .stats
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        for key in &expired {
            self.emit(CacheEvent::Expired {
                source: shared.config.name.clone(),
                timestamp: now,
                key: key.clone(),
            });
        }
        expired.len()
    }
}

/// Background expiry sweep plus the memory gauge refresh.
async fn cleanup_loop(cache: Cache) {
    let mut interval = tokio::time::interval(cache.shared.config.cleanup_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = cache.shared.shutdown.notified() => break,
        }
        if !cache.shared.running.load(Ordering::SeqCst) {
            break;
        }
        let swept = cache.sweep_expired();
        if swept > 0 {
            tracing::debug!(cache = %cache.shared.config.name, swept, "swept expired entries");
        }
        #[cfg(feature = "metrics")]
        {
            let bytes = cache.shared.hot.lock().unwrap().bytes;
            gauge!("batchline_cache_bytes", "cache" => cache.shared.config.name.clone())
                .set(bytes as f64);
        }
    }
}

/// Drains the prefetch queue: first matching producer (registration
/// order) that yields a value wins; its output is inserted via `set`.
async fn prefetch_loop(cache: Cache, mut rx: mpsc::Receiver<String>) {
    while let Some(key) = rx.recv().await {
        if !cache.shared.running.load(Ordering::SeqCst) {
            break;
        }
        if cache.contains_fresh(&key) {
            continue;
        }
        for (prefix, producer) in cache.shared.prefetch.matching(&key) {
            cache.shared.prefetch.mark_active(&prefix);
            let produced = producer(key.clone()).await;
            cache.shared.prefetch.mark_idle(&prefix);
            match produced {
                Ok(Some(value)) => {
                    if let Err(e) = cache.set(&key, value, SetOptions::default()).await {
                        tracing::warn!(cache = %cache.shared.config.name, key = %key, error = %e, "prefetch insert failed");
                    } else {
                        cache
                            .shared
                            .stats
                            .prefetches
                            .fetch_add(1, Ordering::Relaxed);
                        cache.emit(CacheEvent::Prefetched {
                            source: cache.shared.config.name.clone(),
                            timestamp: cache.shared.config.clock.now(),
                            key: key.clone(),
                        });
                    }
                    break;
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(cache = %cache.shared.config.name, key = %key, prefix = %prefix, error = %e, "prefetch producer failed");
                    continue;
                }
            }
        }
    }
}
