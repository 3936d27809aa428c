//! Tests for the coordinator binding the cache and the pipeline.
//!
//! Test organization:
//! - process.rs: Cache-then-pipeline routing, single and batch
//! - report.rs: Snapshots, baselines, recommendations, optimisers

mod process;
mod report;
