//! Task model: identity, priority, budgets, and outcomes.

use crate::error::TaskFailure;
use batchline_core::BoxError;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caller-chosen task identity, unique for the lifetime of the pipeline.
pub type TaskId = String;

/// The work a task performs.
///
/// A factory rather than a future so that retries re-run the closure from
/// scratch.
pub type WorkFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Per-task completion hook, invoked exactly once at terminal state.
pub type CompletionFn<T> = Arc<dyn Fn(&TaskOutcome<T>) + Send + Sync>;

/// Priority class. Scheduling is strict: any ready task of a higher class
/// is dequeued before any task of a lower one; FIFO within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Priority {
    /// Reserved for user-interactive work; there is no aging, so anything
    /// submitted here starves lower classes for as long as it is ready.
    Critical,
    /// Elevated batch work.
    High,
    /// The default class.
    Normal,
    /// Background work.
    Low,
}

impl Priority {
    /// All classes in strict dequeue order.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskPhase {
    /// Waiting on unresolved dependencies.
    PendingDeps,
    /// Ready, sitting in its priority queue.
    Queued,
    /// Executing on a worker.
    Running,
    /// Terminal: work returned a value.
    Completed,
    /// Terminal: budget exhausted, dependency failure, or work error.
    Failed,
    /// Terminal: explicitly cancelled.
    Cancelled,
}

impl TaskPhase {
    /// Returns true for the three terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskPhase::Completed | TaskPhase::Failed | TaskPhase::Cancelled
        )
    }
}

/// Timestamps recorded across a task's lifecycle.
///
/// Retries overwrite `last_started` and `completed` so that the recorded
/// duration reflects the final attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskTimestamps {
    pub created: Option<Instant>,
    pub first_started: Option<Instant>,
    pub last_started: Option<Instant>,
    pub completed: Option<Instant>,
}

/// Terminal result of a task, delivered to awaiters and the completion
/// callback.
#[derive(Debug, Clone)]
pub struct TaskOutcome<T> {
    /// The task's id.
    pub id: TaskId,
    /// The value, or the terminal failure.
    pub result: Result<T, TaskFailure>,
    /// Number of retries consumed when the terminal state was reached.
    pub retries: u32,
    /// Duration of the final attempt (zero when the task never ran).
    pub duration: Duration,
    /// Lifecycle timestamps.
    pub timestamps: TaskTimestamps,
}

impl<T> TaskOutcome<T> {
    /// Returns true if the task completed with a value.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The phase implied by this outcome.
    pub fn phase(&self) -> TaskPhase {
        match &self.result {
            Ok(_) => TaskPhase::Completed,
            Err(TaskFailure::Cancelled) => TaskPhase::Cancelled,
            Err(_) => TaskPhase::Failed,
        }
    }
}

/// A fully-formed unit of work for [`Pipeline::submit`](crate::Pipeline::submit).
///
/// Built through [`Task::builder`]:
///
/// ```
/// use batchline_pipeline::{Priority, Task};
/// use std::time::Duration;
///
/// let task: Task<u64> = Task::builder("parse:src/lib.rs")
///     .priority(Priority::High)
///     .timeout(Duration::from_secs(5))
///     .max_retries(1)
///     .depends_on(["read:src/lib.rs"])
///     .work(|| async { Ok(42) })
///     .build();
/// ```
pub struct Task<T> {
    pub(crate) id: TaskId,
    pub(crate) priority: Priority,
    pub(crate) work: WorkFn<T>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) dependencies: HashSet<TaskId>,
    pub(crate) callback: Option<CompletionFn<T>>,
}

impl<T> Task<T> {
    /// Starts building a task with the given id.
    pub fn builder(id: impl Into<TaskId>) -> TaskBuilder<T> {
        TaskBuilder {
            id: id.into(),
            priority: Priority::Normal,
            work: None,
            timeout: None,
            max_retries: None,
            dependencies: HashSet::new(),
            callback: None,
        }
    }

    /// The task's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The task's priority class.
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Task`].
pub struct TaskBuilder<T> {
    id: TaskId,
    priority: Priority,
    work: Option<WorkFn<T>>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    dependencies: HashSet<TaskId>,
    callback: Option<CompletionFn<T>>,
}

impl<T> TaskBuilder<T> {
    /// Sets the priority class. Default: [`Priority::Normal`].
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the per-task timeout. Falls back to the pipeline's
    /// `default_timeout` when unset.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry budget. Falls back to the pipeline's `max_retries`
    /// when unset.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Adds task ids that must complete before this task may run.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Registers a completion callback, invoked exactly once on the worker
    /// after the terminal state is recorded. Panics in the callback are
    /// caught and counted; they never alter the task's state.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskOutcome<T>) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(f));
        self
    }

    /// Sets the work closure from an async function.
    pub fn work<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.work = Some(Arc::new(move || Box::pin(f())));
        self
    }

    /// Sets the work closure from an already-boxed factory.
    pub fn work_fn(mut self, f: WorkFn<T>) -> Self {
        self.work = Some(f);
        self
    }

    /// Builds the task.
    ///
    /// # Panics
    ///
    /// Panics if no work closure was set.
    pub fn build(self) -> Task<T> {
        let work = self.work.expect("task work must be set before building");
        Task {
            id: self.id,
            priority: self.priority,
            work,
            timeout: self.timeout,
            max_retries: self.max_retries,
            dependencies: self.dependencies,
            callback: self.callback,
        }
    }
}
