//! Cross-partition query execution
//!
//! A query runs as a chain of pull-based [`ExecutionComponent`]s:
//!
//! ```text
//! Fetcher -> Paginator -> DocumentProducer -> PartitionedSource -> [Aggregate] -> [Skip] -> [Top/Limit]
//! ```
//!
//! - [`Fetcher`] / [`Paginator`]: sequential paging over one partition
//! - [`DocumentProducer`]: one partition's pages, absorbing splits through a work list
//! - [`PartitionedSource`]: fan-out, either concatenated by range ([`ParallelSource`]) or
//!   merged by order-by values ([`OrderBySource`])
//! - [`SkipComponent`], [`TakeComponent`], [`AggregateComponent`]: post-processing
//! - [`PipelinedExecutionContext`]: assembles the chain from a query plan
//! - [`ProxyExecutionContext`]: gateway first, pipeline on "cross-partition not servable"
//! - [`QueryExecutionContextFactory`]: entry point
//!
//! Every stage wraps the continuation token of the stage beneath it, so the token handed
//! to the caller rebuilds the same chain when passed back in.

mod aggregate;
mod charge;
mod comparator;
mod component;
mod default;
mod factory;
mod fetcher;
mod order_by;
mod parallel;
mod pipelined;
mod producer;
mod proxy;
mod resume;
mod skip;
mod source;
mod take;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{number_value, AggregateComponent, Aggregator, AGGREGATE_ALIAS};
pub use charge::RequestChargeTracker;
pub use comparator::{ItemComparator, QueryItem};
pub use component::{describe_chain, ExecutionComponent, PageFuture};
pub use default::DefaultExecutionContext;
pub use factory::{DocumentQueryExecutionContext, QueryExecutionContextFactory};
pub use fetcher::{Fetcher, PageExecutor, Paginator};
pub use order_by::{OrderByRow, OrderBySource, DEFAULT_ORDER_BY_PAGE_SIZE};
pub use parallel::ParallelSource;
pub use pipelined::{outward_page_size, OperatorSpec, PipelinedExecutionContext};
pub use producer::{
    DocumentProducer, ProducerEvent, ProducerPage, ProducerSeed, QueryPageExecutor, QueryTarget,
    SplitHandling,
};
pub use proxy::ProxyExecutionContext;
pub use resume::{
    find_target_range, find_target_range_and_extract_continuation_tokens, TargetRanges,
};
pub use skip::SkipComponent;
pub use source::PartitionedSource;
pub use take::{TakeComponent, TakeKind};
