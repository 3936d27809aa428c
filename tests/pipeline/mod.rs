//! Comprehensive tests for the task pipeline.
//!
//! Test organization:
//! - priority_ordering.rs: Strict class order and FIFO within a class
//! - dependencies.rs: Release, transitive failure, cycles, orphans
//! - retry_timeout.rs: Retry budgets and timeout reclaim
//! - cancel_await.rs: Cancellation, await semantics, lifecycle

mod cancel_await;
mod dependencies;
mod retry_timeout;
