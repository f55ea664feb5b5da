//! Partition routing
//!
//! Key-range types shared by the whole pipeline, plus the helper that turns a query
//! plan's query ranges into the set of physical ranges to fan out to.

mod range;
mod resolver;

pub use range::{
    PartitionKeyRange, Range, MAXIMUM_EXCLUSIVE_EFFECTIVE_PARTITION_KEY,
    MINIMUM_INCLUSIVE_EFFECTIVE_PARTITION_KEY,
};
pub use resolver::{resolve_target_ranges, sort_by_min};
