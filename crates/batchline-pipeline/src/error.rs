//! Error types for the task pipeline.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`Pipeline::submit`](crate::Pipeline::submit).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// A task with the same id is already known, active or completed.
    #[error("task id `{0}` already exists")]
    DuplicateId(String),

    /// The submitted task's dependency closure reaches back to itself.
    #[error("task `{0}` would close a dependency cycle")]
    CyclicDependency(String),

    /// The pipeline has not been started or has been stopped.
    #[error("pipeline is not running")]
    NotRunning,
}

/// Errors returned by the await operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AwaitError {
    /// The deadline elapsed before the task reached a terminal state. The
    /// task itself is unaffected.
    #[error("timed out waiting for task")]
    Timeout,

    /// The task id was never submitted.
    #[error("unknown task id `{0}`")]
    UnknownTask(String),
}

/// Terminal failure recorded on a task outcome.
///
/// `Clone` so that the same outcome can be handed to every concurrent
/// awaiter; the work error is therefore held behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum TaskFailure {
    /// The work exceeded its per-task budget.
    #[error("task timed out after {timeout:?}")]
    Timeout {
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// The work returned an error. Participates in retry; the error from
    /// the attempt that exhausted the budget is preserved.
    #[error("task work failed: {source}")]
    Work {
        /// The error produced by the work closure.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A dependency reached FAILED or CANCELLED.
    #[error("dependency `{dep}` failed")]
    DependencyFailed {
        /// Id of the dependency that did not complete.
        dep: String,
    },

    /// The task was cancelled via [`Pipeline::cancel`](crate::Pipeline::cancel)
    /// or by shutdown.
    #[error("task was cancelled")]
    Cancelled,
}

impl TaskFailure {
    pub(crate) fn work(err: batchline_core::BoxError) -> Self {
        TaskFailure::Work { source: err.into() }
    }

    /// Short stable name for the failure kind, used in metrics labels and
    /// reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskFailure::Timeout { .. } => "timeout",
            TaskFailure::Work { .. } => "work_error",
            TaskFailure::DependencyFailed { .. } => "dependency_failed",
            TaskFailure::Cancelled => "cancelled",
        }
    }

    /// Returns true if this failure kind is eligible for retry.
    pub(crate) fn retryable(&self) -> bool {
        matches!(
            self,
            TaskFailure::Timeout { .. } | TaskFailure::Work { .. }
        )
    }
}
