//! Cache-then-call helpers.
//!
//! Where callers would otherwise wrap a function in an ad-hoc
//! check-cache-else-compute pattern, [`memoize`] keeps the call site to
//! one line.

use batchline_cache::{Cache, CacheLevel, SetOptions};
use batchline_core::BoxError;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;

/// Keys longer than this are hashed.
const MAX_KEY_LEN: usize = 200;

/// Runs `f` through the cache: a hit short-circuits, a computed value is
/// stored under `key` with `ttl` before being returned.
pub async fn memoize<F, Fut>(
    cache: &Cache,
    key: &str,
    ttl: Option<Duration>,
    f: F,
) -> Result<Vec<u8>, BoxError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<u8>, BoxError>>,
{
    if let Some(hit) = cache.get(key).await {
        return Ok((*hit).clone());
    }
    let value = f().await?;
    let opts = SetOptions {
        ttl,
        level: CacheLevel::Memory,
    };
    if let Err(e) = cache.set(key, value.clone(), opts).await {
        tracing::warn!(key, error = %e, "memoize failed to cache value");
    }
    Ok(value)
}

/// Builds a stable cache key from parts, hashing when the joined form
/// grows past a bounded length.
pub fn cache_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("|");
    if joined.len() > MAX_KEY_LEN {
        format!("{:x}", Sha256::digest(joined.as_bytes()))
    } else {
        joined
    }
}
