//! Observable events for the query pipeline
//!
//! Events are explicit and typed. Each one is logged as a single `tracing` event.

use std::fmt;

/// Observable events during one query execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Execution context created for a query
    QueryStart,
    /// Result stream finished
    QueryComplete,

    // Bootstrap
    /// Gateway returned a query plan
    QueryPlanRetrieved,
    /// Gateway refused a single-partition execution; pipeline will be built
    CrossPartitionFallback,
    /// Operator chain assembled
    PipelineAssembled,

    // Partition topology
    /// A producer's range was split and replaced by child ranges
    PartitionSplit,

    // Paging
    /// An empty page was folded into the next visible page
    PageFiltered,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::QueryStart => "QUERY_START",
            Event::QueryComplete => "QUERY_COMPLETE",
            Event::QueryPlanRetrieved => "QUERY_PLAN_RETRIEVED",
            Event::CrossPartitionFallback => "CROSS_PARTITION_FALLBACK",
            Event::PipelineAssembled => "PIPELINE_ASSEMBLED",
            Event::PartitionSplit => "PARTITION_SPLIT",
            Event::PageFiltered => "PAGE_FILTERED",
        }
    }

    /// High-volume events are logged at trace level
    pub fn is_verbose(&self) -> bool {
        matches!(self, Event::PageFiltered)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
