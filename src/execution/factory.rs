use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::client::{QueryClient, QueryPlanRetriever};
use crate::config::{ExecutionStrategy, FeedOptions};
use crate::error::QueryResult;
use crate::model::{FeedResponse, SqlQuerySpec};
use crate::log_event;
use crate::observability::{Event, PipelineMetrics};
use crate::routing::resolve_target_ranges;

use super::component::{describe_chain, ExecutionComponent};
use super::default::DefaultExecutionContext;
use super::pipelined::PipelinedExecutionContext;
use super::producer::QueryTarget;
use super::proxy::ProxyExecutionContext;

/// A running query, as handed to the caller
pub struct DocumentQueryExecutionContext {
    root: Box<dyn ExecutionComponent>,
    metrics: Arc<PipelineMetrics>,
    resource_link: String,
    completed: bool,
}

impl DocumentQueryExecutionContext {
    fn new(root: Box<dyn ExecutionComponent>, target: &QueryTarget) -> Self {
        Self {
            root,
            metrics: target.client.metrics.clone(),
            resource_link: target.resource_link.clone(),
            completed: false,
        }
    }

    /// Next page of results; `None` once the query is complete
    pub async fn next_page(&mut self) -> QueryResult<Option<FeedResponse>> {
        if self.completed {
            return Ok(None);
        }
        match self.root.next_page().await? {
            Some(page) => {
                self.metrics.add_items_emitted(page.items.len() as u64);
                Ok(Some(page))
            }
            None => {
                self.completed = true;
                let snapshot = self.metrics.snapshot();
                log_event!(
                    Event::QueryComplete,
                    resource = %self.resource_link,
                    items = snapshot.items_emitted,
                    pages_fetched = snapshot.pages_fetched
                );
                Ok(None)
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, QueryResult<FeedResponse>> {
        stream::try_unfold(self, |mut context| async move {
            let page = context.next_page().await?;
            Ok(page.map(|page| (page, context)))
        })
        .boxed()
    }

    /// Operator names, outermost first
    pub fn operators(&self) -> Vec<&'static str> {
        describe_chain(self.root.as_ref())
    }
}

/// Chooses and builds the execution context for a query
pub struct QueryExecutionContextFactory;

impl QueryExecutionContextFactory {
    #[tracing::instrument(level = "debug", skip(client, query, options), fields(strategy = ?options.strategy))]
    pub async fn create(
        client: &QueryClient,
        resource_link: &str,
        query: SqlQuerySpec,
        options: FeedOptions,
    ) -> QueryResult<DocumentQueryExecutionContext> {
        options.validate()?;
        let collection = client
            .collection_cache
            .resolve_collection(resource_link)
            .await?;

        let target = Arc::new(
            QueryTarget::new(client.clone(), resource_link, collection.resource_id, query)
                .with_page_size(options.max_item_count)
                .with_populate_query_metrics(options.populate_query_metrics),
        );
        log_event!(
            Event::QueryStart,
            resource = %resource_link,
            collection = %target.collection_rid
        );

        let pinned_range = options.partition_key_range_id.clone();
        let root: Box<dyn ExecutionComponent> = if pinned_range.is_some() {
            Box::new(DefaultExecutionContext::new(
                target.clone(),
                pinned_range,
                options.request_continuation.clone(),
            ))
        } else {
            match options.strategy {
                ExecutionStrategy::Fallback => {
                    Box::new(ProxyExecutionContext::new(target.clone(), options))
                }
                ExecutionStrategy::QueryPlan => {
                    let plan = QueryPlanRetriever::new(client)
                        .get_query_plan(&target.query, resource_link)
                        .await?;
                    let ranges = resolve_target_ranges(
                        client.range_cache.as_ref(),
                        &target.collection_rid,
                        &plan.query_ranges,
                        false,
                    )
                    .await?;
                    Box::new(PipelinedExecutionContext::new(&target, &plan, ranges, &options)?)
                }
            }
        };

        Ok(DocumentQueryExecutionContext::new(root, &target))
    }
}
