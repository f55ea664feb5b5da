//! Query configuration
//!
//! [`FeedOptions`] are the per-query knobs a caller passes in. [`PipelineConfig`] is the
//! file-loadable form used by the CLI, carrying default feed options and the headers sent
//! with query-plan requests.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Page size used when the caller leaves it to the backend
pub const DYNAMIC_PAGE_SIZE: i32 = -1;

/// How the factory bootstraps a cross-partition query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStrategy {
    /// Try a gateway (single-partition) execution first, build the pipeline on 400/1004
    #[default]
    Fallback,
    /// Fetch the query plan up front and always build the pipeline
    QueryPlan,
}

/// Per-query options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedOptions {
    /// Max items per page (default: 100, -1 lets the backend decide)
    #[serde(default = "default_max_item_count")]
    pub max_item_count: i32,

    /// Continuation token from a previous page of the same query
    #[serde(default)]
    pub request_continuation: Option<String>,

    /// Emit pages with zero results instead of folding their charge into the next page
    #[serde(default)]
    pub allow_empty_pages: bool,

    /// Restrict the query to one partition key range (no fan-out)
    #[serde(default)]
    pub partition_key_range_id: Option<String>,

    /// Ask the backend for per-partition query metrics
    #[serde(default = "default_populate_query_metrics")]
    pub populate_query_metrics: bool,

    #[serde(default)]
    pub strategy: ExecutionStrategy,
}

fn default_max_item_count() -> i32 {
    100
}

fn default_populate_query_metrics() -> bool {
    true
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            max_item_count: default_max_item_count(),
            request_continuation: None,
            allow_empty_pages: false,
            partition_key_range_id: None,
            populate_query_metrics: default_populate_query_metrics(),
            strategy: ExecutionStrategy::default(),
        }
    }
}

impl FeedOptions {
    pub fn with_max_item_count(mut self, max_item_count: i32) -> Self {
        self.max_item_count = max_item_count;
        self
    }

    pub fn with_continuation(mut self, continuation: impl Into<String>) -> Self {
        self.request_continuation = Some(continuation.into());
        self
    }

    pub fn with_allow_empty_pages(mut self, allow: bool) -> Self {
        self.allow_empty_pages = allow;
        self
    }

    pub fn with_partition_key_range_id(mut self, id: impl Into<String>) -> Self {
        self.partition_key_range_id = Some(id.into());
        self
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Rejects page sizes the backend would refuse
    pub fn validate(&self) -> QueryResult<()> {
        if self.max_item_count == 0 || self.max_item_count < DYNAMIC_PAGE_SIZE {
            return Err(QueryError::configuration(format!(
                "maxItemCount must be positive or -1, got {}",
                self.max_item_count
            )));
        }
        Ok(())
    }
}

/// File-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default)]
    pub feed_options: FeedOptions,

    /// Value of the supported-features header on query-plan requests
    #[serde(default = "default_supported_query_features")]
    pub supported_query_features: String,

    /// Value of the query-version header on query-plan requests
    #[serde(default = "default_query_version")]
    pub query_version: String,
}

fn default_supported_query_features() -> String {
    crate::client::SUPPORTED_QUERY_FEATURES.to_string()
}

fn default_query_version() -> String {
    crate::client::QUERY_VERSION.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feed_options: FeedOptions::default(),
            supported_query_features: default_supported_query_features(),
            query_version: default_query_version(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> QueryResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            QueryError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| QueryError::configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QueryResult<()> {
        self.feed_options.validate()?;
        if self.supported_query_features.trim().is_empty() {
            return Err(QueryError::configuration(
                "supportedQueryFeatures must not be empty",
            ));
        }
        Ok(())
    }
}
