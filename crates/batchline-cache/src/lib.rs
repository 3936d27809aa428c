//! Two-tier intelligent cache.
//!
//! A hot in-memory tier with a byte budget and pluggable eviction (LRU,
//! LFU, TTL-proximity, or a composite adaptive score), backed by a warm
//! disk tier of content-addressed blobs whose expiry survives restart.
//! True misses can trigger registered prefetch producers in the
//! background.
//!
//! # Example
//!
//! ```rust,no_run
//! use batchline_cache::{Cache, CacheConfig, EvictionPolicy, SetOptions};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), batchline_cache::CacheError> {
//! let cache = Cache::new(
//!     CacheConfig::builder()
//!         .name("analysis-results")
//!         .memory_budget(64 * 1024 * 1024)
//!         .eviction_policy(EvictionPolicy::Adaptive)
//!         .disk_dir(".cache")
//!         .build(),
//! );
//! cache.start().await?;
//!
//! cache
//!     .set(
//!         "analysis:src/main.rs",
//!         b"finding: unused import".to_vec(),
//!         SetOptions::ttl(Duration::from_secs(600)),
//!     )
//!     .await?;
//!
//! if let Some(hit) = cache.get("analysis:src/main.rs").await {
//!     assert!(hit.starts_with(b"finding"));
//! }
//!
//! cache.stop().await;
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod disk;
mod entry;
mod error;
mod events;
mod eviction;
mod prefetch;
mod stats;

pub use cache::{Cache, SetOptions};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use disk::sanitize_key;
pub use entry::{CacheLevel, Tier};
pub use error::CacheError;
pub use events::CacheEvent;
pub use eviction::EvictionPolicy;
pub use prefetch::PrefetchProducer;
pub use stats::{CacheStats, MemoryUsage};
