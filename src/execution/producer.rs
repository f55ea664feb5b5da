//! Per-partition result production with split recovery
//!
//! A [`DocumentProducer`] starts with one partition key range and a work list. It pages
//! through the range at the front of the list. When the backend reports that the range was
//! split, the producer asks the range cache for the ranges that now cover it and seeds one
//! work item per child: the first child resumes from the continuation that hit the split,
//! the rest start fresh. Children that split again are handled the same way, so nested
//! splits never deepen the call stack.
//!
//! With [`SplitHandling::Flatten`] the children are drained in range order behind the
//! caller's back. With [`SplitHandling::Surface`] the producer stops and hands the seeds to
//! the caller, which is what the order-by merge needs to keep one slot per range.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::client::{execute_with_retry, QueryClient};
use crate::error::{QueryError, QueryResult};
use crate::model::{headers, FeedResponse, QueryMetrics, QueryRequest, SqlQuerySpec};
use crate::log_event;
use crate::observability::Event;
use crate::routing::{sort_by_min, PartitionKeyRange};

use super::fetcher::{Fetcher, PageExecutor, Paginator};

/// Everything shared by the producers of one query
#[derive(Debug, Clone)]
pub struct QueryTarget {
    pub client: QueryClient,
    pub resource_link: String,
    pub collection_rid: String,
    /// Query text sent to each partition
    pub query: SqlQuerySpec,
    pub page_size: i32,
    pub populate_query_metrics: bool,
    pub is_change_feed: bool,
}

impl QueryTarget {
    pub fn new(
        client: QueryClient,
        resource_link: impl Into<String>,
        collection_rid: impl Into<String>,
        query: SqlQuerySpec,
    ) -> Self {
        Self {
            client,
            resource_link: resource_link.into(),
            collection_rid: collection_rid.into(),
            query,
            page_size: crate::config::DYNAMIC_PAGE_SIZE,
            populate_query_metrics: false,
            is_change_feed: false,
        }
    }

    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_populate_query_metrics(mut self, populate: bool) -> Self {
        self.populate_query_metrics = populate;
        self
    }
}

/// Sends requests for one partition (or the gateway when no range is given)
///
/// Each request runs under a fresh retry policy; `retries` reflects the last request.
pub struct QueryPageExecutor {
    target: Arc<QueryTarget>,
    partition_key_range_id: Option<String>,
    retries: i64,
}

impl QueryPageExecutor {
    pub fn new(target: Arc<QueryTarget>, partition_key_range_id: Option<String>) -> Self {
        Self {
            target,
            partition_key_range_id,
            retries: -1,
        }
    }

    pub fn retries(&self) -> i64 {
        self.retries
    }
}

impl PageExecutor for QueryPageExecutor {
    fn create_request(&self, continuation: Option<String>, page_size: i32) -> QueryRequest {
        let mut request = QueryRequest::new(&self.target.resource_link, self.target.query.clone())
            .with_continuation(continuation)
            .with_max_item_count(page_size)
            .with_header(headers::IS_QUERY, "True")
            .with_header(headers::CONTENT_TYPE, "application/query+json");
        if let Some(id) = &self.partition_key_range_id {
            request = request
                .with_partition_key_range_id(id.clone())
                .with_header(headers::ENABLE_CROSS_PARTITION_QUERY, "True");
        }
        if self.target.populate_query_metrics {
            request = request.with_header(headers::POPULATE_QUERY_METRICS, "True");
        }
        request
    }

    fn execute_request<'a>(
        &'a mut self,
        mut request: QueryRequest,
    ) -> Pin<Box<dyn Future<Output = QueryResult<FeedResponse>> + Send + 'a>> {
        Box::pin(async move {
            let client = &self.target.client;
            let executor = client.executor.as_ref();
            let mut policy = client.retry_policy_factory.create();

            let result = execute_with_retry(
                policy.as_mut(),
                &mut request,
                &mut self.retries,
                |req| async move { executor.execute_query(&req).await },
            )
            .await;
            let mut page = result?;
            client.metrics.increment_pages_fetched();

            let metrics_header = page.header(headers::QUERY_METRICS).map(QueryMetrics::parse);
            if metrics_header.is_some() || self.retries > 0 {
                let metrics = metrics_header
                    .unwrap_or_default()
                    .with_retries(self.retries.max(0) as u64);
                let key = self
                    .partition_key_range_id
                    .clone()
                    .unwrap_or_default();
                page.merge_query_metrics(HashMap::from([(key, metrics)]));
            }
            Ok(page)
        })
    }
}

/// A work item: a range plus the continuation to start it from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSeed {
    pub range: PartitionKeyRange,
    pub continuation: Option<String>,
}

impl ProducerSeed {
    pub fn new(range: PartitionKeyRange, continuation: Option<String>) -> Self {
        Self {
            range,
            continuation,
        }
    }
}

/// A page together with where it came from
#[derive(Debug, Clone)]
pub struct ProducerPage {
    pub page: FeedResponse,
    /// The range that served the page
    pub range: PartitionKeyRange,
    /// Continuation the page was requested with
    pub fetched_with: Option<String>,
}

#[derive(Debug)]
pub enum ProducerEvent {
    Page(ProducerPage),
    /// Only produced with [`SplitHandling::Surface`]; the producer is finished afterwards
    Split(Vec<ProducerSeed>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitHandling {
    Flatten,
    Surface,
}

struct ActiveRange {
    range: PartitionKeyRange,
    paginator: Paginator<QueryPageExecutor>,
}

pub struct DocumentProducer {
    target: Arc<QueryTarget>,
    split_handling: SplitHandling,
    /// Item budget shared by every range this producer drains
    top: Option<u32>,
    active: Option<ActiveRange>,
    pending: VecDeque<ProducerSeed>,
}

impl DocumentProducer {
    pub fn new(
        target: Arc<QueryTarget>,
        seed: ProducerSeed,
        split_handling: SplitHandling,
        top: Option<u32>,
    ) -> Self {
        Self {
            target,
            split_handling,
            top,
            active: None,
            pending: VecDeque::from([seed]),
        }
    }

    /// Range currently being drained, or next in line
    pub fn current_range(&self) -> Option<&PartitionKeyRange> {
        self.active
            .as_ref()
            .map(|a| &a.range)
            .or_else(|| self.pending.front().map(|s| &s.range))
    }

    pub fn is_finished(&self) -> bool {
        self.active.is_none() && self.pending.is_empty()
    }

    /// Next page or split notification; `None` once every range is drained
    pub async fn next_event(&mut self) -> QueryResult<Option<ProducerEvent>> {
        loop {
            if self.top == Some(0) {
                self.active = None;
                self.pending.clear();
                return Ok(None);
            }

            let mut active = match self.active.take() {
                Some(active) => active,
                None => match self.pending.pop_front() {
                    Some(seed) => self.activate(seed),
                    None => return Ok(None),
                },
            };

            if !active.paginator.has_more() {
                continue;
            }

            let fetched_with = active.paginator.continuation().map(str::to_string);
            match active.paginator.next_page().await {
                Ok(Some(page)) => {
                    if let Some(top) = self.top.as_mut() {
                        *top = top.saturating_sub(page.items.len() as u32);
                    }
                    let range = active.range.clone();
                    self.active = Some(active);
                    return Ok(Some(ProducerEvent::Page(ProducerPage {
                        page,
                        range,
                        fetched_with,
                    })));
                }
                Ok(None) => continue,
                Err(e) if e.is_partition_split() => {
                    let children = self.resolve_children(&active.range, fetched_with, e).await?;
                    match self.split_handling {
                        SplitHandling::Flatten => {
                            for child in children.into_iter().rev() {
                                self.pending.push_front(child);
                            }
                        }
                        SplitHandling::Surface => {
                            return Ok(Some(ProducerEvent::Split(children)));
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn activate(&self, seed: ProducerSeed) -> ActiveRange {
        let executor = QueryPageExecutor::new(self.target.clone(), Some(seed.range.id.clone()));
        let fetcher = Fetcher::new(
            executor,
            seed.continuation,
            self.target.is_change_feed,
            self.top,
            self.target.page_size,
        );
        ActiveRange {
            range: seed.range,
            paginator: Paginator::new(fetcher),
        }
    }

    async fn resolve_children(
        &self,
        parent: &PartitionKeyRange,
        continuation: Option<String>,
        split_error: QueryError,
    ) -> QueryResult<Vec<ProducerSeed>> {
        let client = &self.target.client;
        let mut children = client
            .range_cache
            .resolve_overlapping_ranges(&self.target.collection_rid, &parent.to_range(), true)
            .await?;

        if children.is_empty() || (children.len() == 1 && children[0].id == parent.id) {
            tracing::warn!(
                range = %parent.id,
                "split reported but range cache has no replacement ranges"
            );
            return Err(split_error);
        }
        sort_by_min(&mut children);

        let child_ids = children
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        log_event!(Event::PartitionSplit, range = %parent.id, children = %child_ids);
        client.metrics.increment_splits_absorbed();

        let mut continuation = continuation;
        Ok(children
            .into_iter()
            .map(|range| ProducerSeed::new(range, continuation.take()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{status, ServiceError};
    use crate::simulator::InMemoryContainer;
    use serde_json::json;

    fn target(container: &Arc<InMemoryContainer>, page_size: i32) -> Arc<QueryTarget> {
        let client = QueryClient::from_backend(container.clone());
        Arc::new(
            QueryTarget::new(
                client,
                container.resource_link(),
                container.resource_id(),
                SqlQuerySpec::new("SELECT * FROM c"),
            )
            .with_page_size(page_size),
        )
    }

    fn container() -> Arc<InMemoryContainer> {
        let container = InMemoryContainer::new(
            "dbs/db/colls/c",
            vec![PartitionKeyRange::new("0", "41", "4D")],
        );
        for (i, key) in ["A", "B", "C", "G", "H", "K"].iter().enumerate() {
            container.insert(json!({"id": format!("d{}", i), "pk": key}));
        }
        Arc::new(container)
    }

    async fn drain(producer: &mut DocumentProducer) -> Vec<(String, Vec<String>)> {
        let mut out = Vec::new();
        while let Some(event) = producer.next_event().await.unwrap() {
            match event {
                ProducerEvent::Page(p) => out.push((
                    p.range.id.clone(),
                    p.page
                        .items
                        .iter()
                        .map(|d| d["id"].as_str().unwrap_or_default().to_string())
                        .collect(),
                )),
                ProducerEvent::Split(_) => panic!("flattening producer surfaced a split"),
            }
        }
        out
    }

    #[tokio::test]
    async fn test_drains_range_in_pages() {
        let container = container();
        let seed = ProducerSeed::new(PartitionKeyRange::new("0", "41", "4D"), None);
        let mut producer =
            DocumentProducer::new(target(&container, 4), seed, SplitHandling::Flatten, None);

        let pages = drain(&mut producer).await;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].1, vec!["d0", "d1", "d2", "d3"]);
        assert_eq!(pages[1].1, vec!["d4", "d5"]);
        assert!(producer.is_finished());
    }

    #[tokio::test]
    async fn test_split_is_absorbed_in_range_order() {
        let container = container();
        let seed = ProducerSeed::new(PartitionKeyRange::new("0", "41", "4D"), None);
        let mut producer =
            DocumentProducer::new(target(&container, 2), seed, SplitHandling::Flatten, None);

        let first = producer.next_event().await.unwrap();
        assert!(matches!(first, Some(ProducerEvent::Page(_))));

        container.split_range("0", "46").unwrap();
        let rest = drain(&mut producer).await;

        let ids: Vec<String> = rest.iter().flat_map(|(_, ids)| ids.clone()).collect();
        assert_eq!(ids, vec!["d2", "d3", "d4", "d5"]);
        assert_eq!(producer.target.client.metrics.snapshot().splits_absorbed, 1);

        // First child resumed from the parent's token, the second started fresh
        let requests = container.request_log();
        let child_requests: Vec<_> = requests
            .iter()
            .filter(|r| r.partition_key_range_id.as_deref() != Some("0"))
            .map(|r| (r.partition_key_range_id.clone(), r.continuation.clone()))
            .collect();
        assert_eq!(child_requests[0].1.as_deref(), Some("d1"));
        let second_child = child_requests
            .iter()
            .find(|(id, _)| id != &child_requests[0].0)
            .unwrap();
        assert_eq!(second_child.1, None);
    }

    #[tokio::test]
    async fn test_surface_returns_children() {
        let container = container();
        container.split_range("0", "46").unwrap();

        let seed = ProducerSeed::new(PartitionKeyRange::new("0", "41", "4D"), Some("d1".into()));
        let mut producer =
            DocumentProducer::new(target(&container, 2), seed, SplitHandling::Surface, None);

        match producer.next_event().await.unwrap() {
            Some(ProducerEvent::Split(children)) => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0].range.min_inclusive, "41");
                assert_eq!(children[0].continuation.as_deref(), Some("d1"));
                assert_eq!(children[1].range.min_inclusive, "46");
                assert!(children[1].continuation.is_none());
            }
            other => panic!("expected split, got {:?}", other),
        }
        assert!(producer.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_split_errors_propagate() {
        let container = container();
        container.inject_failure(
            "0",
            ServiceError::new(status::INTERNAL_SERVER_ERROR, 0, "boom"),
        );
        let seed = ProducerSeed::new(PartitionKeyRange::new("0", "41", "4D"), None);
        let mut producer =
            DocumentProducer::new(target(&container, 2), seed, SplitHandling::Flatten, None);

        let err = producer.next_event().await.unwrap_err();
        assert_eq!(err.status_code(), status::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_split_without_replacements_propagates() {
        let container = container();
        container.inject_failure("0", ServiceError::partition_key_range_gone("0"));
        let seed = ProducerSeed::new(PartitionKeyRange::new("0", "41", "4D"), None);
        let mut producer =
            DocumentProducer::new(target(&container, 2), seed, SplitHandling::Flatten, None);

        // Range "0" is still live, so the cache returns it unchanged
        let err = producer.next_event().await.unwrap_err();
        assert!(err.is_partition_split());
    }

    #[tokio::test]
    async fn test_top_budget_spans_children() {
        let container = container();
        container.split_range("0", "46").unwrap();
        let seed = ProducerSeed::new(PartitionKeyRange::new("0", "41", "4D"), None);
        let mut producer =
            DocumentProducer::new(target(&container, 2), seed, SplitHandling::Flatten, Some(5));

        let pages = drain(&mut producer).await;
        let total: usize = pages.iter().map(|(_, ids)| ids.len()).sum();
        assert_eq!(total, 5);
    }
}
