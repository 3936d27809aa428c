//! Rolling sample window.
//!
//! Throughput and average-execution-time gauges are computed over the last
//! N samples rather than over process lifetime, so a long-idle pipeline
//! does not report a stale average forever.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A fixed-capacity window of `(when, value)` samples.
///
/// Guarded by its own mutex; the engines record into it from worker
/// threads and snapshot it from the metrics ticker.
#[derive(Debug)]
pub struct RollingWindow {
    samples: Mutex<VecDeque<(Instant, f64)>>,
    capacity: usize,
}

impl RollingWindow {
    /// Creates a window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Records a sample taken at `when`.
    pub fn record(&self, when: Instant, value: f64) {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back((when, value));
    }

    /// Returns the mean of the values currently in the window.
    pub fn mean(&self) -> f64 {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|(_, v)| v).sum::<f64>() / samples.len() as f64
    }

    /// Returns samples per second over the span of the window, measured up
    /// to `now`.
    pub fn rate_per_second(&self, now: Instant) -> f64 {
        let samples = self.samples.lock().unwrap();
        let Some((oldest, _)) = samples.front() else {
            return 0.0;
        };
        let span = now.saturating_duration_since(*oldest);
        if span < Duration::from_millis(1) {
            return 0.0;
        }
        samples.len() as f64 / span.as_secs_f64()
    }

    /// Returns the number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    /// Returns true if no samples have been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all samples.
    pub fn clear(&self) {
        self.samples.lock().unwrap().clear();
    }
}
