//! Configuration for the pipeline.

use crate::events::TaskEvent;
use batchline_core::{Clock, EventListeners, FnListener, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`Pipeline`](crate::Pipeline) instance.
pub struct PipelineConfig {
    pub(crate) name: String,
    pub(crate) max_workers: usize,
    pub(crate) max_concurrent: usize,
    pub(crate) default_timeout: Duration,
    pub(crate) max_retries: u32,
    pub(crate) metrics_interval: Duration,
    pub(crate) event_listeners: EventListeners<TaskEvent>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl PipelineConfig {
    /// Creates a new builder with default values.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    name: String,
    max_workers: usize,
    max_concurrent: usize,
    default_timeout: Duration,
    max_retries: u32,
    metrics_interval: Duration,
    event_listeners: EventListeners<TaskEvent>,
    clock: Arc<dyn Clock>,
}

impl PipelineConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            max_workers: num_cpus::get() + 4,
            max_concurrent: 100,
            default_timeout: Duration::from_secs(30),
            max_retries: 3,
            metrics_interval: Duration::from_secs(5),
            event_listeners: EventListeners::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the name of this pipeline instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the worker pool size.
    ///
    /// Default: logical CPUs + 4
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Caps the number of simultaneously executing tasks. May be set below
    /// the pool size to reserve headroom for short-lived sub-work.
    ///
    /// Default: 100
    pub fn max_concurrent(mut self, concurrent: usize) -> Self {
        self.max_concurrent = concurrent.max(1);
        self
    }

    /// Sets the fallback per-task timeout for tasks that do not carry one.
    ///
    /// Default: 30 seconds
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the fallback retry budget for tasks that do not carry one.
    ///
    /// Default: 3
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the gauge sampling period of the metrics ticker.
    ///
    /// Default: 5 seconds
    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }

    /// Replaces the time source; tests inject a
    /// [`ManualClock`](batchline_core::ManualClock) here.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers a raw event listener.
    pub fn listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Registers a callback for every task that reaches COMPLETED.
    pub fn on_task_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let TaskEvent::Completed { id, .. } = event {
                f(id);
            }
        }));
        self
    }

    /// Registers a callback for every task that reaches FAILED.
    pub fn on_task_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &'static str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let TaskEvent::Failed { id, kind, .. } = event {
                f(id, *kind);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> PipelineConfig {
        PipelineConfig {
            name: self.name,
            max_workers: self.max_workers,
            max_concurrent: self.max_concurrent,
            default_timeout: self.default_timeout,
            max_retries: self.max_retries,
            metrics_interval: self.metrics_interval,
            event_listeners: self.event_listeners,
            clock: self.clock,
        }
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved per-task budget: the task's own settings, or the pipeline
/// defaults.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TaskBudget {
    pub(crate) timeout: Duration,
    pub(crate) max_retries: u32,
}

impl PipelineConfig {
    pub(crate) fn budget_for<T>(&self, task: &crate::task::Task<T>) -> TaskBudget {
        TaskBudget {
            timeout: task.timeout.unwrap_or(self.default_timeout),
            max_retries: task.max_retries.unwrap_or(self.max_retries),
        }
    }
}
