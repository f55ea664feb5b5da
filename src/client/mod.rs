//! Collaborators the pipeline runs against
//!
//! The traits in this module are the only way the pipeline reaches the outside world:
//! page execution, partition key range lookups, collection metadata and the query-plan
//! gateway. [`QueryClient`] bundles one implementation of each, plus the retry policy
//! factory and the shared pipeline counters, so execution contexts can be built from a
//! single handle.

mod backend;
mod plan;
mod retry;

use std::sync::Arc;

pub use backend::{
    BackendFuture, CollectionCache, CollectionMetadata, QueryExecutor, QueryPlanGateway,
    RangeCache,
};
pub use plan::{QueryPlanRetriever, QUERY_VERSION, SUPPORTED_QUERY_FEATURES};
pub use retry::{
    execute_with_retry, no_retry, NoRetryPolicy, RetryDecision, RetryPolicy, RetryPolicyFactory,
};

use crate::config::PipelineConfig;
use crate::observability::PipelineMetrics;

/// Handle to every collaborator a query needs
#[derive(Clone)]
pub struct QueryClient {
    pub executor: Arc<dyn QueryExecutor>,
    pub range_cache: Arc<dyn RangeCache>,
    pub collection_cache: Arc<dyn CollectionCache>,
    pub plan_gateway: Arc<dyn QueryPlanGateway>,
    pub retry_policy_factory: Arc<dyn RetryPolicyFactory>,
    pub metrics: Arc<PipelineMetrics>,
    /// Sent with plan requests
    pub supported_query_features: String,
    pub query_version: String,
}

impl QueryClient {
    /// Uses one backend for every collaborator role
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: QueryExecutor + RangeCache + CollectionCache + QueryPlanGateway + 'static,
    {
        Self {
            executor: backend.clone(),
            range_cache: backend.clone(),
            collection_cache: backend.clone(),
            plan_gateway: backend,
            retry_policy_factory: Arc::new(no_retry),
            metrics: Arc::new(PipelineMetrics::new()),
            supported_query_features: SUPPORTED_QUERY_FEATURES.to_string(),
            query_version: QUERY_VERSION.to_string(),
        }
    }

    pub fn with_retry_policy_factory(mut self, factory: Arc<dyn RetryPolicyFactory>) -> Self {
        self.retry_policy_factory = factory;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Applies the plan-request headers from a config file
    pub fn with_config(mut self, config: &PipelineConfig) -> Self {
        self.supported_query_features = config.supported_query_features.clone();
        self.query_version = config.query_version.clone();
        self
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("supported_query_features", &self.supported_query_features)
            .field("query_version", &self.query_version)
            .finish_non_exhaustive()
    }
}
