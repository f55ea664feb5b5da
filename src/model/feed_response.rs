//! Result pages

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::error::status;

use super::query_metrics::{merge_query_metrics, QueryMetrics};

/// Header names exchanged with the backend
pub mod headers {
    pub const CONTINUATION: &str = "x-ms-continuation";
    pub const REQUEST_CHARGE: &str = "x-ms-request-charge";
    pub const ACTIVITY_ID: &str = "x-ms-activity-id";
    pub const ITEM_COUNT: &str = "x-ms-item-count";
    pub const QUERY_METRICS: &str = "x-ms-documentdb-query-metrics";
    pub const POPULATE_QUERY_METRICS: &str = "x-ms-documentdb-populatequerymetrics";
    pub const PARTITION_KEY_RANGE_ID: &str = "x-ms-documentdb-partitionkeyrangeid";
    pub const IS_QUERY: &str = "x-ms-documentdb-isquery";
    pub const ENABLE_CROSS_PARTITION_QUERY: &str = "x-ms-documentdb-query-enablecrosspartition";
    pub const IS_QUERY_PLAN_REQUEST: &str = "x-ms-cosmos-is-query-plan-request";
    pub const SUPPORTED_QUERY_FEATURES: &str = "x-ms-cosmos-supported-query-features";
    pub const QUERY_VERSION: &str = "x-ms-cosmos-query-version";
    pub const CONTENT_TYPE: &str = "content-type";
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct FeedResponse {
    pub items: Vec<Value>,
    /// `None` means this source has nothing more to return
    pub continuation: Option<String>,
    pub request_charge: f64,
    pub activity_id: Option<Uuid>,
    pub status_code: u16,
    /// Remaining response headers, raw
    pub headers: HashMap<String, String>,
    /// Per-partition metrics keyed by partition key range id
    pub query_metrics: HashMap<String, QueryMetrics>,
}

impl Default for FeedResponse {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FeedResponse {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            continuation: None,
            request_charge: 0.0,
            activity_id: None,
            status_code: status::OK,
            headers: HashMap::new(),
            query_metrics: HashMap::new(),
        }
    }

    /// A page with no items
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_continuation(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn with_request_charge(mut self, charge: f64) -> Self {
        self.request_charge = charge;
        self
    }

    pub fn with_activity_id(mut self, activity_id: Uuid) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query_metrics(mut self, metrics: HashMap<String, QueryMetrics>) -> Self {
        self.query_metrics = metrics;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Change feed: nothing changed since the supplied continuation
    pub fn is_not_modified(&self) -> bool {
        self.status_code == status::NOT_MODIFIED
    }

    /// Folds other pages' metrics into this page
    pub fn merge_query_metrics(&mut self, metrics: HashMap<String, QueryMetrics>) {
        merge_query_metrics(&mut self.query_metrics, metrics);
    }
}
