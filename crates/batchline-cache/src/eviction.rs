//! Eviction policies for the hot tier.
//!
//! Selection is byte-driven: a policy keeps choosing victims until at
//! least `needed` bytes would be freed, never off an entry-count
//! heuristic.

use crate::entry::HotEntry;
use lru::LruCache;
use std::time::Instant;

/// Weight of the recency term in the adaptive score.
const W_RECENCY: f64 = 0.4;
/// Weight of the frequency term.
const W_FREQUENCY: f64 = 0.3;
/// Weight of the inverse-size term.
const W_SIZE: f64 = 0.2;
/// Weight of the remaining-TTL term.
const W_TTL: f64 = 0.1;

/// Time constant of the recency decay, in seconds.
const RECENCY_TAU_SECS: f64 = 3600.0;

/// Eviction policy for the hot tier, selected once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict from the least-recently-used end of the index.
    Lru,
    /// Evict in ascending access-count order; ties broken by age, older
    /// first.
    Lfu,
    /// Evict in ascending time-to-expiry; entries without a TTL go last.
    Ttl,
    /// Composite score over recency, frequency, size, and TTL slack;
    /// lowest scores evicted first.
    Adaptive,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::Adaptive
    }
}

/// Composite adaptive score; higher is more worth keeping.
pub(crate) fn adaptive_score(
    entry: &HotEntry,
    now: Instant,
    max_access: u64,
    max_size: usize,
) -> f64 {
    let idle = now.saturating_duration_since(entry.last_access).as_secs_f64();
    let recency = 1.0 / (1.0 + idle / RECENCY_TAU_SECS);
    let frequency = entry.access_count as f64 / max_access.max(1) as f64;
    let size_inverse = 1.0 - entry.size as f64 / max_size.max(1) as f64;
    let ttl_slack = entry.ttl_slack(now);
    W_RECENCY * recency + W_FREQUENCY * frequency + W_SIZE * size_inverse + W_TTL * ttl_slack
}

/// Picks keys to evict until at least `needed` bytes are covered.
///
/// Returns fewer bytes' worth only when the whole index is smaller than
/// `needed`.
pub(crate) fn select_victims(
    index: &LruCache<String, HotEntry>,
    policy: EvictionPolicy,
    needed: usize,
    now: Instant,
) -> Vec<String> {
    match policy {
        EvictionPolicy::Lru => {
            // The LRU end of the index is the back of the iteration order.
            take_until(index.iter().rev(), needed)
        }
        EvictionPolicy::Lfu => {
            let mut candidates: Vec<_> = index.iter().collect();
            candidates.sort_by(|(_, a), (_, b)| {
                a.access_count
                    .cmp(&b.access_count)
                    .then(a.created.cmp(&b.created))
            });
            take_until(candidates.into_iter(), needed)
        }
        EvictionPolicy::Ttl => {
            let mut candidates: Vec<_> = index.iter().collect();
            candidates.sort_by(|(_, a), (_, b)| {
                let slack = |entry: &HotEntry| {
                    entry
                        .ttl
                        .map(|ttl| {
                            ttl.saturating_sub(now.saturating_duration_since(entry.created))
                        })
                        // No TTL sorts after every real deadline.
                        .unwrap_or(std::time::Duration::MAX)
                };
                slack(a).cmp(&slack(b)).then(a.created.cmp(&b.created))
            });
            take_until(candidates.into_iter(), needed)
        }
        EvictionPolicy::Adaptive => {
            let max_access = index.iter().map(|(_, e)| e.access_count).max().unwrap_or(1);
            let max_size = index.iter().map(|(_, e)| e.size).max().unwrap_or(1);
            let mut scored: Vec<_> = index
                .iter()
                .map(|(key, entry)| (key, entry, adaptive_score(entry, now, max_access, max_size)))
                .collect();
            scored.sort_by(|(_, _, a), (_, _, b)| a.total_cmp(b));
            take_until(scored.into_iter().map(|(k, e, _)| (k, e)), needed)
        }
    }
}

fn take_until<'a, I>(candidates: I, needed: usize) -> Vec<String>
where
    I: Iterator<Item = (&'a String, &'a HotEntry)>,
{
    let mut victims = Vec::new();
    let mut freed = 0usize;
    for (key, entry) in candidates {
        if freed >= needed {
            break;
        }
        victims.push(key.clone());
        freed += entry.size;
    }
    victims
}
