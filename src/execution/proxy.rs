use std::sync::Arc;

use crate::client::QueryPlanRetriever;
use crate::config::FeedOptions;
use crate::error::{QueryError, QueryResult};
use crate::model::{FeedResponse, PartitionedQueryExecutionInfo};
use crate::log_event;
use crate::observability::Event;
use crate::routing::resolve_target_ranges;

use super::component::{ExecutionComponent, PageFuture};
use super::default::DefaultExecutionContext;
use super::pipelined::PipelinedExecutionContext;
use super::producer::QueryTarget;

enum ProxyState {
    Default(DefaultExecutionContext),
    Pipelined(PipelinedExecutionContext),
}

/// Tries the gateway first and builds the cross-partition pipeline when refused
///
/// Only a "cross-partition query not servable" response before any page was returned
/// switches to the pipeline. The plan embedded in that response is used; if it is
/// missing the plan is fetched from the gateway.
pub struct ProxyExecutionContext {
    target: Arc<QueryTarget>,
    options: FeedOptions,
    state: ProxyState,
    emitted_any: bool,
}

impl ProxyExecutionContext {
    pub fn new(target: Arc<QueryTarget>, options: FeedOptions) -> Self {
        let default = DefaultExecutionContext::new(
            target.clone(),
            None,
            options.request_continuation.clone(),
        );
        Self {
            target,
            options,
            state: ProxyState::Default(default),
            emitted_any: false,
        }
    }

    pub fn is_pipelined(&self) -> bool {
        matches!(self.state, ProxyState::Pipelined(_))
    }

    async fn next_page_inner(&mut self) -> QueryResult<Option<FeedResponse>> {
        loop {
            let result = match &mut self.state {
                ProxyState::Pipelined(pipeline) => return pipeline.next_page().await,
                ProxyState::Default(default) => default.next_page().await,
            };
            match result {
                Ok(page) => {
                    self.emitted_any |= page.is_some();
                    return Ok(page);
                }
                Err(e) if e.is_cross_partition_query_not_servable() && !self.emitted_any => {
                    let pipeline = Self::build_pipeline(&self.target, &self.options, &e).await?;
                    self.state = ProxyState::Pipelined(pipeline);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn build_pipeline(
        target: &Arc<QueryTarget>,
        options: &FeedOptions,
        refusal: &QueryError,
    ) -> QueryResult<PipelinedExecutionContext> {
        let client = &target.client;
        client.metrics.increment_cross_partition_fallbacks();
        log_event!(Event::CrossPartitionFallback, resource = %target.resource_link);

        let embedded = refusal
            .service_error()
            .and_then(|e| e.additional_error_info.as_deref())
            .filter(|payload| !payload.trim().is_empty());
        let plan = match embedded {
            Some(payload) => PartitionedQueryExecutionInfo::parse(payload)?,
            None => {
                QueryPlanRetriever::new(client)
                    .get_query_plan(&target.query, &target.resource_link)
                    .await?
            }
        };

        let ranges = resolve_target_ranges(
            client.range_cache.as_ref(),
            &target.collection_rid,
            &plan.query_ranges,
            false,
        )
        .await?;
        PipelinedExecutionContext::new(target, &plan, ranges, options)
    }
}

impl ExecutionComponent for ProxyExecutionContext {
    fn next_page(&mut self) -> PageFuture<'_> {
        Box::pin(self.next_page_inner())
    }

    fn operator(&self) -> &'static str {
        "Proxy"
    }

    fn inner(&self) -> Option<&dyn ExecutionComponent> {
        match &self.state {
            ProxyState::Default(default) => Some(default),
            ProxyState::Pipelined(pipeline) => Some(pipeline),
        }
    }
}
