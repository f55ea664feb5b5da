//! Wire-level data model
//!
//! Requests, result pages and the gateway's query plan.

mod feed_response;
mod query_info;
mod query_metrics;
mod request;

pub use feed_response::{headers, FeedResponse};
pub use query_info::{
    AggregateOperator, DistinctType, PartitionedQueryExecutionInfo, QueryInfo, SortOrder,
    ORDER_BY_FILTER_PLACEHOLDER,
};
pub use query_metrics::{merge_query_metrics, QueryMetrics};
pub use request::{QueryRequest, SqlParameter, SqlQuerySpec};
