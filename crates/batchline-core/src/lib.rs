//! Core infrastructure for batchline.
//!
//! This crate provides the shared functionality used by the pipeline and
//! cache engines:
//! - Injectable monotonic clock
//! - Event system for observability
//! - Rolling sample windows for throughput-style gauges

pub mod clock;
pub mod events;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{Event, EventListener, EventListeners, FnListener};
pub use window::RollingWindow;

/// Type-erased error carried across the opaque-work boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
