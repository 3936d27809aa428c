//! Comprehensive tests for the two-tier cache.
//!
//! Test organization:
//! - eviction_policies.rs: Byte-budget eviction across all four policies
//! - ttl_expiry.rs: TTL semantics with an injected clock
//! - disk_persistence.rs: Warm tier, restart survival, corruption
//! - prefetch.rs: Pattern-driven prefetch and the recursion guard
//! - stats.rs: Statistics arithmetic and memory breakdown

mod stats;
