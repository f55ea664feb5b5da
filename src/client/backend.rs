//! Collaborator contracts
//!
//! Transport, caches and the query-plan gateway live outside this crate. The pipeline
//! only talks to them through these traits.

use std::future::Future;
use std::pin::Pin;

use crate::error::QueryResult;
use crate::model::{FeedResponse, QueryRequest};
use crate::routing::{PartitionKeyRange, Range};

/// Boxed future returned by collaborator calls
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = QueryResult<T>> + Send + 'a>>;

/// Sends one page request and returns the page
pub trait QueryExecutor: Send + Sync {
    fn execute_query<'a>(&'a self, request: &'a QueryRequest) -> BackendFuture<'a, FeedResponse>;
}

/// Partition key range lookups
///
/// Implementations are expected to be internally synchronized; the pipeline never
/// mutates the cache except by asking for a forced refresh.
pub trait RangeCache: Send + Sync {
    /// Ranges currently overlapping `range`, in any order
    fn resolve_overlapping_ranges<'a>(
        &'a self,
        collection_rid: &'a str,
        range: &'a Range,
        force_refresh: bool,
    ) -> BackendFuture<'a, Vec<PartitionKeyRange>>;
}

/// What the pipeline needs to know about a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMetadata {
    pub resource_id: String,
    pub partition_key_paths: Vec<String>,
}

pub trait CollectionCache: Send + Sync {
    fn resolve_collection<'a>(
        &'a self,
        resource_link: &'a str,
    ) -> BackendFuture<'a, CollectionMetadata>;
}

/// Returns the serialized query plan for a plan request
pub trait QueryPlanGateway: Send + Sync {
    fn fetch_query_plan<'a>(&'a self, request: &'a QueryRequest) -> BackendFuture<'a, String>;
}
