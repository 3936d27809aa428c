//! Performance substrate for batch code-analysis workloads.
//!
//! batchline accepts large streams of analysis tasks, executes them with
//! bounded concurrency under strict priority discipline, and amortises
//! repeat work through a two-tier cache. The crate is domain-agnostic: it
//! transports opaque work closures and opaque byte values, tuned for many
//! short CPU/IO-mixed tasks with high locality across runs.
//!
//! Three pieces:
//!
//! - [`Pipeline`] — priority-scheduled, dependency-aware executor with
//!   retry, timeout, and cancellation ([`batchline_pipeline`]).
//! - [`Cache`] — hot in-memory tier plus warm disk tier, with pluggable
//!   eviction and pattern-driven prefetch ([`batchline_cache`]).
//! - [`Coordinator`] — binds the two: probes the cache, submits misses to
//!   the pipeline, writes results back, and reports aggregate metrics.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use batchline::{Coordinator, CoordinatorConfig, ProcessOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = Coordinator::new(
//!     CoordinatorConfig::builder()
//!         .name("analysis")
//!         .max_workers(8)
//!         .disk_dir(".cache")
//!         .build(),
//! );
//! coordinator.start().await?;
//!
//! let findings = coordinator
//!     .process(
//!         "analysis:src/main.rs",
//!         || async {
//!             // run the analyser; any `Result<Vec<u8>, _>` future works
//!             Ok(b"no findings".to_vec())
//!         },
//!         ProcessOptions::default(),
//!     )
//!     .await?;
//! assert_eq!(findings, b"no findings");
//!
//! println!("{}", serde_json::to_string_pretty(&coordinator.report())?);
//! coordinator.stop().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod memoize;
mod report;

pub use config::{CoordinatorConfig, CoordinatorConfigBuilder};
pub use coordinator::{Coordinator, OptimizerFn, ProcessError, ProcessOptions};
pub use memoize::{cache_key, memoize};
pub use report::{PerformanceReport, PerformanceSnapshot};

// The engines, re-exported for embedders that want direct access.
pub use batchline_cache::{
    Cache, CacheConfig, CacheError, CacheEvent, CacheLevel, CacheStats, EvictionPolicy,
    MemoryUsage, SetOptions,
};
pub use batchline_core::{BoxError, Clock, ManualClock, SystemClock};
pub use batchline_pipeline::{
    AwaitError, Pipeline, PipelineConfig, PipelineMetrics, Priority, SubmitError, Task,
    TaskFailure, TaskOutcome, TaskPhase,
};
