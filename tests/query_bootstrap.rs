//! Query Bootstrap Tests
//!
//! How a query gets from the caller to an operator chain:
//! - gateway-first execution and the switch to the pipeline on refusal
//! - up-front plan retrieval
//! - operator ordering and page sizing
//! - aggregates over every partition

use std::sync::Arc;

use docdb_query::client::{QueryClient, RetryDecision, RetryPolicy, RetryPolicyFactory};
use docdb_query::config::{ExecutionStrategy, FeedOptions};
use docdb_query::error::{status, QueryError, ServiceError};
use docdb_query::execution::QueryExecutionContextFactory;
use docdb_query::model::{AggregateOperator, FeedResponse, QueryInfo, QueryRequest, SqlQuerySpec};
use docdb_query::routing::PartitionKeyRange;
use docdb_query::simulator::InMemoryContainer;
use futures_util::TryStreamExt;
use serde_json::{json, Value};

const LINK: &str = "dbs/db/colls/c";

// =============================================================================
// Helper Functions
// =============================================================================

fn container(ranges: Vec<PartitionKeyRange>, info: QueryInfo) -> Arc<InMemoryContainer> {
    let container = InMemoryContainer::new(LINK, ranges).with_query_info(info);
    for (i, key) in ["A", "B", "C", "D", "E", "V", "W", "X", "Y", "Z"].iter().enumerate() {
        container.insert(json!({"id": format!("d{}", i), "pk": key, "n": i}));
    }
    Arc::new(container)
}

fn two_ranges() -> Vec<PartitionKeyRange> {
    vec![
        PartitionKeyRange::new("0", "", "50"),
        PartitionKeyRange::new("1", "50", "FF"),
    ]
}

fn items(pages: &[FeedResponse]) -> Vec<Value> {
    pages.iter().flat_map(|p| p.items.clone()).collect()
}

async fn collect(
    client: &QueryClient,
    query: &str,
    options: FeedOptions,
) -> Result<Vec<FeedResponse>, QueryError> {
    QueryExecutionContextFactory::create(client, LINK, SqlQuerySpec::new(query), options)
        .await?
        .into_stream()
        .try_collect()
        .await
}

// =============================================================================
// Gateway Fallback Tests
// =============================================================================

/// A single-range container is served by the gateway without a plan.
#[tokio::test]
async fn test_single_partition_needs_no_plan() {
    let container = container(vec![PartitionKeyRange::full("0")], QueryInfo::default());
    let client = QueryClient::from_backend(container.clone());

    let pages = collect(&client, "SELECT * FROM c", FeedOptions::default()).await.unwrap();

    assert_eq!(items(&pages).len(), 10);
    let snapshot = client.metrics.snapshot();
    assert_eq!(snapshot.cross_partition_fallbacks, 0);
    assert_eq!(snapshot.items_emitted, 10);
    assert!(container
        .request_log()
        .iter()
        .all(|r| r.partition_key_range_id.is_none()));
}

/// A refused query is rebuilt as a pipeline from the plan in the refusal.
#[tokio::test]
async fn test_refusal_switches_to_pipeline() {
    let info = QueryInfo {
        top: Some(3),
        ..Default::default()
    };
    let container = container(two_ranges(), info);
    let client = QueryClient::from_backend(container.clone());

    let pages = collect(&client, "SELECT TOP 3 * FROM c", FeedOptions::default())
        .await
        .unwrap();

    let ids: Vec<_> = items(&pages).iter().map(|d| d["id"].clone()).collect();
    assert_eq!(ids, vec![json!("d0"), json!("d1"), json!("d2")]);
    let snapshot = client.metrics.snapshot();
    assert_eq!(snapshot.cross_partition_fallbacks, 1);
    // The plan came embedded in the refusal
    assert_eq!(snapshot.query_plans_retrieved, 0);
}

/// Other gateway errors end the query.
#[tokio::test]
async fn test_gateway_error_propagates() {
    let container = container(two_ranges(), QueryInfo::default());
    container.inject_gateway_failure(ServiceError::new(status::TOO_MANY_REQUESTS, 0, "busy"));
    let client = QueryClient::from_backend(container);

    let err = collect(&client, "SELECT * FROM c", FeedOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), status::TOO_MANY_REQUESTS);
}

// =============================================================================
// Plan Retrieval Tests
// =============================================================================

/// Retries on throttling before giving up
struct RetryThrottled {
    attempts_left: u32,
}

impl RetryPolicy for RetryThrottled {
    fn on_before_send_request(&mut self, _request: &mut QueryRequest) {}

    fn should_retry(&mut self, error: &QueryError) -> RetryDecision {
        if error.status_code() == status::TOO_MANY_REQUESTS && self.attempts_left > 0 {
            self.attempts_left -= 1;
            RetryDecision::RetryAfter(std::time::Duration::from_millis(1))
        } else {
            RetryDecision::DoNotRetry
        }
    }
}

/// A throttled partition request is retried under the client's policy.
#[tokio::test]
async fn test_partition_request_retried() {
    let container = container(two_ranges(), QueryInfo::default());
    container.inject_failure("1", ServiceError::new(status::TOO_MANY_REQUESTS, 0, "busy"));
    let factory: Arc<dyn RetryPolicyFactory> = Arc::new(|| -> Box<dyn RetryPolicy> {
        Box::new(RetryThrottled { attempts_left: 2 })
    });
    let client = QueryClient::from_backend(container.clone()).with_retry_policy_factory(factory);
    let options = FeedOptions::default().with_strategy(ExecutionStrategy::QueryPlan);

    let pages = collect(&client, "SELECT * FROM c", options).await.unwrap();

    assert_eq!(items(&pages).len(), 10);
    let retried = pages
        .iter()
        .filter_map(|p| p.query_metrics.get("1"))
        .map(|m| m.retries)
        .max();
    assert_eq!(retried, Some(1));
}

/// GROUP BY plans are refused before anything is sent to a partition.
#[tokio::test]
async fn test_group_by_plan_rejected() {
    let info = QueryInfo {
        group_by_expressions: vec!["c.pk".into()],
        ..Default::default()
    };
    let container = container(two_ranges(), info);
    let client = QueryClient::from_backend(container.clone());
    let options = FeedOptions::default().with_strategy(ExecutionStrategy::QueryPlan);

    let err = collect(&client, "SELECT c.pk FROM c GROUP BY c.pk", options)
        .await
        .unwrap_err();
    assert!(err.is_bad_request());
    assert!(container.request_log().is_empty());
}

// =============================================================================
// Assembly Tests
// =============================================================================

#[tokio::test]
async fn test_operator_chain_order() {
    let info = QueryInfo {
        offset: Some(1),
        limit: Some(2),
        ..Default::default()
    };
    let container = container(two_ranges(), info);
    let client = QueryClient::from_backend(container);
    let options = FeedOptions::default().with_strategy(ExecutionStrategy::QueryPlan);

    let context = QueryExecutionContextFactory::create(
        &client,
        LINK,
        SqlQuerySpec::new("SELECT * FROM c OFFSET 1 LIMIT 2"),
        options,
    )
    .await
    .unwrap();
    assert_eq!(
        context.operators(),
        vec!["Pipelined", "Skip", "Limit", "Parallel"]
    );

    let pages: Vec<FeedResponse> = context.into_stream().try_collect().await.unwrap();
    let ns: Vec<i64> = items(&pages).iter().filter_map(|d| d["n"].as_i64()).collect();
    assert_eq!(ns, vec![1, 2]);
}

#[tokio::test]
async fn test_top_bounds_page_size() {
    let info = QueryInfo {
        top: Some(4),
        ..Default::default()
    };
    let container = container(two_ranges(), info);
    let client = QueryClient::from_backend(container.clone());
    let options = FeedOptions::default()
        .with_max_item_count(50)
        .with_strategy(ExecutionStrategy::QueryPlan);

    let pages = collect(&client, "SELECT TOP 4 * FROM c", options).await.unwrap();

    assert_eq!(items(&pages).len(), 4);
    assert!(container.request_log().iter().all(|r| r.max_item_count <= 4));
}

// =============================================================================
// Aggregate Tests
// =============================================================================

#[tokio::test]
async fn test_count_value_across_partitions() {
    let info = QueryInfo {
        aggregates: vec![AggregateOperator::Count],
        has_select_value: true,
        ..Default::default()
    };
    let container = container(two_ranges(), info);
    let client = QueryClient::from_backend(container);

    let pages = collect(&client, "SELECT VALUE COUNT(1) FROM c", FeedOptions::default())
        .await
        .unwrap();

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].items, vec![json!(10)]);
    assert!(pages[0].continuation.is_none());
    assert_eq!(pages[0].request_charge, 2.0);
}

#[tokio::test]
async fn test_count_without_value_is_aliased() {
    let info = QueryInfo {
        aggregates: vec![AggregateOperator::Count],
        has_select_value: false,
        ..Default::default()
    };
    let container = container(two_ranges(), info);
    let client = QueryClient::from_backend(container);

    let pages = collect(&client, "SELECT COUNT(1) FROM c", FeedOptions::default())
        .await
        .unwrap();

    assert_eq!(pages[0].items, vec![json!({"$1": 10})]);
}

#[tokio::test]
async fn test_split_before_start_targets_children() {
    let container = container(two_ranges(), QueryInfo::default());
    container.split_range("0", "43").unwrap();
    let client = QueryClient::from_backend(container.clone());
    let options = FeedOptions::default().with_strategy(ExecutionStrategy::QueryPlan);

    let pages = collect(&client, "SELECT * FROM c", options).await.unwrap();

    assert_eq!(items(&pages).len(), 10);
    assert_eq!(client.metrics.snapshot().splits_absorbed, 0);
    assert!(container
        .request_log()
        .iter()
        .all(|r| r.partition_key_range_id.as_deref() != Some("0")));
}
