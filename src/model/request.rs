//! Query requests sent to the backend

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A named query parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: Value,
}

/// Query text plus parameters, as posted to the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlQuerySpec {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SqlParameter>,
}

impl SqlQuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.push(SqlParameter {
            name: name.into(),
            value,
        });
        self
    }

    /// Same parameters, different text
    pub fn with_query_text(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: self.parameters.clone(),
        }
    }
}

/// One page request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Correlates retries of the same logical request
    pub activity_id: Uuid,
    pub resource_link: String,
    pub query: SqlQuerySpec,
    /// Target partition; `None` lets the gateway route the query
    pub partition_key_range_id: Option<String>,
    pub continuation: Option<String>,
    pub max_item_count: i32,
    pub headers: HashMap<String, String>,
}

impl QueryRequest {
    pub fn new(resource_link: impl Into<String>, query: SqlQuerySpec) -> Self {
        Self {
            activity_id: Uuid::new_v4(),
            resource_link: resource_link.into(),
            query,
            partition_key_range_id: None,
            continuation: None,
            max_item_count: crate::config::DYNAMIC_PAGE_SIZE,
            headers: HashMap::new(),
        }
    }

    pub fn with_partition_key_range_id(mut self, id: impl Into<String>) -> Self {
        self.partition_key_range_id = Some(id.into());
        self
    }

    pub fn with_continuation(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn with_max_item_count(mut self, max_item_count: i32) -> Self {
        self.max_item_count = max_item_count;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = QueryRequest::new("dbs/db/colls/c", SqlQuerySpec::new("SELECT * FROM c"))
            .with_partition_key_range_id("3")
            .with_continuation(Some("t1".into()))
            .with_max_item_count(10)
            .with_header("x-ms-documentdb-isquery", "True");

        assert_eq!(request.partition_key_range_id.as_deref(), Some("3"));
        assert_eq!(request.continuation.as_deref(), Some("t1"));
        assert_eq!(request.max_item_count, 10);
        assert_eq!(request.header("x-ms-documentdb-isquery"), Some("True"));
    }

    #[test]
    fn test_query_spec_serialization_omits_empty_parameters() {
        let spec = SqlQuerySpec::new("SELECT * FROM c");
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"query": "SELECT * FROM c"})
        );

        let spec = spec.with_parameter("@age", json!(30));
        let rewritten = spec.with_query_text("SELECT VALUE c FROM c");
        assert_eq!(rewritten.parameters.len(), 1);
    }
}
