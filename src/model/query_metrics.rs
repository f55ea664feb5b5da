//! Per-partition query metrics
//!
//! The backend reports execution statistics in the query-metrics header as
//! `key=value` pairs separated by `;`. Unknown keys are ignored and malformed values are
//! skipped with a warning; metrics never fail a query.

use std::collections::HashMap;
use std::ops::AddAssign;

use serde::Serialize;

/// Execution statistics for one partition (or the sum of several)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetrics {
    pub retrieved_document_count: u64,
    pub retrieved_document_size: u64,
    pub output_document_count: u64,
    pub output_document_size: u64,
    pub index_hit_document_count: u64,
    pub total_execution_time_ms: f64,
    pub query_compile_time_ms: f64,
    pub document_load_time_ms: f64,
    /// Client-side: retries spent on the request that produced the page
    pub retries: u64,
}

impl QueryMetrics {
    /// Parse a query-metrics header value
    pub fn parse(header: &str) -> Self {
        let mut metrics = QueryMetrics::default();
        for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                tracing::warn!(pair, "skipping query metric without value");
                continue;
            };
            if let Err(e) = metrics.set(key.trim(), value.trim()) {
                tracing::warn!(key, value, error = %e, "skipping malformed query metric");
            }
        }
        metrics
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), std::num::ParseFloatError> {
        let int = |v: &str| v.parse::<f64>().map(|n| n.max(0.0) as u64);
        match key {
            "retrievedDocumentCount" => self.retrieved_document_count = int(value)?,
            "retrievedDocumentSize" => self.retrieved_document_size = int(value)?,
            "outputDocumentCount" => self.output_document_count = int(value)?,
            "outputDocumentSize" => self.output_document_size = int(value)?,
            "indexHitDocumentCount" => self.index_hit_document_count = int(value)?,
            "totalExecutionTimeInMs" => self.total_execution_time_ms = value.parse()?,
            "queryCompileTimeInMs" => self.query_compile_time_ms = value.parse()?,
            "documentLoadTimeInMs" => self.document_load_time_ms = value.parse()?,
            _ => {}
        }
        Ok(())
    }

    pub fn with_retries(mut self, retries: u64) -> Self {
        self.retries = retries;
        self
    }
}

impl AddAssign<&QueryMetrics> for QueryMetrics {
    fn add_assign(&mut self, other: &QueryMetrics) {
        self.retrieved_document_count += other.retrieved_document_count;
        self.retrieved_document_size += other.retrieved_document_size;
        self.output_document_count += other.output_document_count;
        self.output_document_size += other.output_document_size;
        self.index_hit_document_count += other.index_hit_document_count;
        self.total_execution_time_ms += other.total_execution_time_ms;
        self.query_compile_time_ms += other.query_compile_time_ms;
        self.document_load_time_ms += other.document_load_time_ms;
        self.retries += other.retries;
    }
}

/// Adds every entry of `from` into `into`, summing entries for the same range id
pub fn merge_query_metrics(
    into: &mut HashMap<String, QueryMetrics>,
    from: HashMap<String, QueryMetrics>,
) {
    for (range_id, metrics) in from {
        *into.entry(range_id).or_default() += &metrics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let metrics = QueryMetrics::parse(
            "totalExecutionTimeInMs=33.67;queryCompileTimeInMs=0.06;retrievedDocumentCount=2000;\
             retrievedDocumentSize=1125600;outputDocumentCount=2000;unknownMetric=1",
        );
        assert_eq!(metrics.retrieved_document_count, 2000);
        assert_eq!(metrics.retrieved_document_size, 1125600);
        assert_eq!(metrics.output_document_count, 2000);
        assert!((metrics.total_execution_time_ms - 33.67).abs() < 1e-9);
    }

    #[test]
    fn test_parse_skips_malformed_pairs() {
        let metrics = QueryMetrics::parse("retrievedDocumentCount=abc;outputDocumentCount=3;junk");
        assert_eq!(metrics.retrieved_document_count, 0);
        assert_eq!(metrics.output_document_count, 3);
    }

    #[test]
    fn test_merge_sums_same_range() {
        let mut into = HashMap::new();
        into.insert("0".to_string(), QueryMetrics::parse("outputDocumentCount=2"));

        let mut from = HashMap::new();
        from.insert(
            "0".to_string(),
            QueryMetrics::parse("outputDocumentCount=3").with_retries(1),
        );
        from.insert("1".to_string(), QueryMetrics::parse("outputDocumentCount=4"));

        merge_query_metrics(&mut into, from);
        assert_eq!(into["0"].output_document_count, 5);
        assert_eq!(into["0"].retries, 1);
        assert_eq!(into["1"].output_document_count, 4);
    }
}
