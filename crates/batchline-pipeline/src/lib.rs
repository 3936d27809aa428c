//! Priority-scheduled, dependency-aware task pipeline.
//!
//! The pipeline accepts opaque work closures keyed by caller-chosen ids,
//! schedules them across a bounded worker pool in strict priority order
//! (FIFO within a class), releases dependents as their dependencies
//! complete, and drives a retry/timeout state machine per task.
//!
//! # Example
//!
//! ```rust,no_run
//! use batchline_pipeline::{Pipeline, PipelineConfig, Priority, Task};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let pipeline: Pipeline<u64> = Pipeline::new(
//!     PipelineConfig::builder()
//!         .name("analysis")
//!         .max_workers(8)
//!         .default_timeout(Duration::from_secs(30))
//!         .build(),
//! );
//! pipeline.start().await;
//!
//! pipeline
//!     .submit(
//!         Task::builder("lint:src/main.rs")
//!             .priority(Priority::High)
//!             .work(|| async { Ok(17) })
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let outcome = pipeline
//!     .await_task("lint:src/main.rs", Some(Duration::from_secs(10)))
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.result.unwrap(), 17);
//!
//! pipeline.stop().await;
//! # }
//! ```

mod config;
mod error;
mod events;
mod graph;
mod metrics;
mod pipeline;
mod task;

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{AwaitError, SubmitError, TaskFailure};
pub use events::TaskEvent;
pub use metrics::{PipelineMetrics, QueueDepths};
pub use pipeline::Pipeline;
pub use task::{
    CompletionFn, Priority, Task, TaskBuilder, TaskId, TaskOutcome, TaskPhase, TaskTimestamps,
    WorkFn,
};
