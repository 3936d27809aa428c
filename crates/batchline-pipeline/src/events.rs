//! Events emitted by the pipeline.

use crate::task::Priority;
use batchline_core::Event;
use std::time::{Duration, Instant};

/// Lifecycle events, one per state-machine edge.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task was accepted by `submit`.
    Submitted {
        source: String,
        timestamp: Instant,
        id: String,
        priority: Priority,
    },
    /// A worker picked the task up.
    Started {
        source: String,
        timestamp: Instant,
        id: String,
        attempt: u32,
    },
    /// The work returned a value.
    Completed {
        source: String,
        timestamp: Instant,
        id: String,
        duration: Duration,
    },
    /// The task reached FAILED.
    Failed {
        source: String,
        timestamp: Instant,
        id: String,
        kind: &'static str,
    },
    /// A failed attempt was re-queued.
    Retried {
        source: String,
        timestamp: Instant,
        id: String,
        attempt: u32,
    },
    /// The task was cancelled.
    Cancelled {
        source: String,
        timestamp: Instant,
        id: String,
    },
}

impl Event for TaskEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::Submitted { .. } => "task_submitted",
            TaskEvent::Started { .. } => "task_started",
            TaskEvent::Completed { .. } => "task_completed",
            TaskEvent::Failed { .. } => "task_failed",
            TaskEvent::Retried { .. } => "task_retried",
            TaskEvent::Cancelled { .. } => "task_cancelled",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            TaskEvent::Submitted { timestamp, .. }
            | TaskEvent::Started { timestamp, .. }
            | TaskEvent::Completed { timestamp, .. }
            | TaskEvent::Failed { timestamp, .. }
            | TaskEvent::Retried { timestamp, .. }
            | TaskEvent::Cancelled { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            TaskEvent::Submitted { source, .. }
            | TaskEvent::Started { source, .. }
            | TaskEvent::Completed { source, .. }
            | TaskEvent::Failed { source, .. }
            | TaskEvent::Retried { source, .. }
            | TaskEvent::Cancelled { source, .. } => source,
        }
    }
}
