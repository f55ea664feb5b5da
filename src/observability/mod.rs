//! Observability for the query pipeline
//!
//! - Structured logging through `tracing`
//! - Lock-free pipeline counters
//! - Typed lifecycle events
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No background work
//!
//! # Usage
//!
//! ```ignore
//! use docdb_query::log_event;
//! use docdb_query::observability::{Event, PipelineMetrics};
//!
//! log_event!(Event::PartitionSplit, range = %"3", children = 2);
//!
//! let metrics = PipelineMetrics::new();
//! metrics.increment_splits_absorbed();
//! ```

mod events;
mod metrics;

pub use events::Event;
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};

/// Log a lifecycle event with structured fields
///
/// Fields use `tracing` syntax and are recorded as-is next to the `event` field.
/// [`Event::is_verbose`] events go to trace level, the rest to debug.
#[macro_export]
macro_rules! log_event {
    ($event:expr $(, $($field:tt)+)?) => {{
        let event: $crate::observability::Event = $event;
        if event.is_verbose() {
            ::tracing::trace!(event = %event $(, $($field)+)?);
        } else {
            ::tracing::debug!(event = %event $(, $($field)+)?);
        }
    }};
}
