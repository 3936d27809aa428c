//! Pipeline metrics: atomic counters plus rolling windows, snapshotted on
//! demand and exported on the metrics tick.

use batchline_core::RollingWindow;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Samples kept for the throughput and execution-time windows.
pub(crate) const WINDOW_SAMPLES: usize = 100;

/// Queue depth per priority class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    pub critical: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl QueueDepths {
    /// Total tasks queued across all classes.
    pub fn total(&self) -> usize {
        self.critical + self.high + self.normal + self.low
    }
}

/// Point-in-time snapshot of pipeline state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineMetrics {
    /// Tasks accepted by `submit`.
    pub submitted: u64,
    /// Tasks that reached COMPLETED.
    pub completed: u64,
    /// Tasks that reached FAILED.
    pub failed: u64,
    /// Tasks that reached CANCELLED.
    pub cancelled: u64,
    /// Re-queued attempts across all tasks.
    pub retries: u64,
    /// Completion-callback panics that were caught.
    pub callback_panics: u64,
    /// Queue depth by priority class.
    pub queue_depths: QueueDepths,
    /// Tasks currently executing.
    pub in_flight: usize,
    /// Tasks parked on unresolved dependencies.
    pub pending_deps: usize,
    /// Pending tasks waiting on an id the pipeline has never seen.
    pub pending_deps_orphans: usize,
    /// Highest simultaneous in-flight count observed.
    pub peak_in_flight: usize,
    /// in-flight / worker pool size, 0.0..=1.0.
    pub worker_utilization: f64,
    /// Completions per second over the rolling window.
    pub throughput_per_sec: f64,
    /// Mean execution time over the rolling window, in milliseconds.
    pub avg_execution_ms: f64,
}

/// Shared counter block; cheap to update from workers.
pub(crate) struct Counters {
    pub(crate) submitted: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) cancelled: AtomicU64,
    pub(crate) retries: AtomicU64,
    pub(crate) callback_panics: AtomicU64,
    pub(crate) peak_in_flight: AtomicUsize,
    /// Mean execution time, rolling.
    pub(crate) exec_times: RollingWindow,
    /// Completion instants, rolling, for throughput.
    pub(crate) completions: RollingWindow,
}

impl Counters {
    pub(crate) fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            callback_panics: AtomicU64::new(0),
            peak_in_flight: AtomicUsize::new(0),
            exec_times: RollingWindow::new(WINDOW_SAMPLES),
            completions: RollingWindow::new(WINDOW_SAMPLES),
        }
    }

    /// Raises the peak gauge if `current` exceeds it.
    pub(crate) fn observe_in_flight(&self, current: usize) {
        self.peak_in_flight.fetch_max(current, Ordering::Relaxed);
    }
}
