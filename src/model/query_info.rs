//! Query plan as delivered by the gateway

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::routing::Range;

/// Placeholder the gateway leaves in rewritten order-by queries for the resume filter
pub const ORDER_BY_FILTER_PLACEHOLDER: &str = "{documentdb-formattableorderbyquery-filter}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistinctType {
    #[default]
    None,
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOperator {
    Average,
    Count,
    Max,
    Min,
    Sum,
}

/// Post-processing flags for a cross-partition query
///
/// Parsed once from the plan payload and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryInfo {
    #[serde(default)]
    pub distinct_type: DistinctType,
    #[serde(default)]
    pub top: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub order_by: Vec<SortOrder>,
    #[serde(default)]
    pub order_by_expressions: Vec<String>,
    #[serde(default)]
    pub group_by_expressions: Vec<String>,
    #[serde(default)]
    pub aggregates: Vec<AggregateOperator>,
    #[serde(default)]
    pub has_select_value: bool,
    #[serde(default)]
    pub rewritten_query: Option<String>,
}

impl QueryInfo {
    pub fn has_top(&self) -> bool {
        self.top.is_some()
    }

    pub fn has_offset(&self) -> bool {
        self.offset.is_some()
    }

    pub fn has_limit(&self) -> bool {
        self.limit.is_some()
    }

    pub fn has_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn has_aggregates(&self) -> bool {
        !self.aggregates.is_empty()
    }

    pub fn has_group_by(&self) -> bool {
        !self.group_by_expressions.is_empty()
    }

    pub fn has_distinct(&self) -> bool {
        self.distinct_type != DistinctType::None
    }

    pub fn has_rewritten_query(&self) -> bool {
        self.rewritten_query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty())
    }

    /// Rewritten query text with the order-by filter placeholder neutralized
    pub fn formatted_rewritten_query(&self) -> Option<String> {
        if !self.has_rewritten_query() {
            return None;
        }
        self.rewritten_query
            .as_deref()
            .map(|q| q.replace(ORDER_BY_FILTER_PLACEHOLDER, "true"))
    }

    /// Rejects plans the pipeline cannot execute
    pub fn validate(&self) -> QueryResult<()> {
        if self.has_group_by() {
            return Err(QueryError::unsupported_query_plan(
                "GROUP BY is not supported in cross-partition queries",
            ));
        }
        if self.has_distinct() {
            return Err(QueryError::unsupported_query_plan(
                "DISTINCT is not supported in cross-partition queries",
            ));
        }
        if self.aggregates.len() > 1 && !self.has_select_value {
            return Err(QueryError::bad_request(
                "multiple aggregates are only supported for single-partition queries",
            ));
        }
        if self.has_aggregates() && self.has_order_by() {
            return Err(QueryError::unsupported_query_plan(
                "aggregates cannot be combined with ORDER BY",
            ));
        }
        if self.order_by.len() != self.order_by_expressions.len()
            && !self.order_by_expressions.is_empty()
        {
            return Err(QueryError::unsupported_query_plan(
                "orderBy and orderByExpressions lengths differ",
            ));
        }
        Ok(())
    }
}

/// The gateway's full plan payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionedQueryExecutionInfo {
    #[serde(default)]
    pub partitioned_query_execution_info_version: u32,
    #[serde(default)]
    pub query_info: QueryInfo,
    #[serde(default)]
    pub query_ranges: Vec<Range>,
}

impl PartitionedQueryExecutionInfo {
    pub fn parse(payload: &str) -> QueryResult<Self> {
        serde_json::from_str(payload)
            .map_err(|e| QueryError::unsupported_query_plan(format!("invalid query plan: {}", e)))
    }

    pub fn to_json(&self) -> QueryResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_BY_PLAN: &str = r#"{
        "partitionedQueryExecutionInfoVersion": 2,
        "queryInfo": {
            "distinctType": "None",
            "top": null,
            "offset": null,
            "limit": null,
            "orderBy": ["Ascending"],
            "orderByExpressions": ["c.age"],
            "groupByExpressions": [],
            "aggregates": [],
            "hasSelectValue": false,
            "rewrittenQuery": "SELECT c._rid, [{\"item\": c.age}] AS orderByItems, c AS payload FROM c WHERE ({documentdb-formattableorderbyquery-filter}) ORDER BY c.age"
        },
        "queryRanges": [{"min": "", "max": "FF", "isMinInclusive": true, "isMaxInclusive": false}]
    }"#;

    #[test]
    fn test_parse_order_by_plan() {
        let plan = PartitionedQueryExecutionInfo::parse(ORDER_BY_PLAN).unwrap();
        assert_eq!(plan.partitioned_query_execution_info_version, 2);
        assert!(plan.query_info.has_order_by());
        assert!(!plan.query_info.has_top());
        assert_eq!(plan.query_ranges, vec![Range::full()]);
        assert!(plan.query_info.validate().is_ok());
    }

    #[test]
    fn test_rewritten_query_placeholder_replaced() {
        let plan = PartitionedQueryExecutionInfo::parse(ORDER_BY_PLAN).unwrap();
        let query = plan.query_info.formatted_rewritten_query().unwrap();
        assert!(query.contains("WHERE (true)"));
        assert!(!query.contains(ORDER_BY_FILTER_PLACEHOLDER));
    }

    #[test]
    fn test_missing_fields_default() {
        let plan = PartitionedQueryExecutionInfo::parse(r#"{"queryInfo": {"top": 5}}"#).unwrap();
        assert_eq!(plan.query_info.top, Some(5));
        assert!(plan.query_ranges.is_empty());
        assert!(plan.query_info.formatted_rewritten_query().is_none());
    }

    #[test]
    fn test_unsupported_plans_rejected() {
        let group_by = QueryInfo {
            group_by_expressions: vec!["c.team".into()],
            ..Default::default()
        };
        assert!(group_by.validate().unwrap_err().is_bad_request());

        let distinct = QueryInfo {
            distinct_type: DistinctType::Ordered,
            ..Default::default()
        };
        assert!(distinct.validate().is_err());

        let aggregates = QueryInfo {
            aggregates: vec![AggregateOperator::Count, AggregateOperator::Sum],
            ..Default::default()
        };
        assert_eq!(
            aggregates.validate().unwrap_err().code(),
            crate::error::ErrorCode::BadRequest
        );
    }

    #[test]
    fn test_invalid_plan_payload() {
        assert!(PartitionedQueryExecutionInfo::parse("not a plan").is_err());
    }
}
