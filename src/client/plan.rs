//! Query plan retrieval

use crate::error::QueryResult;
use crate::model::{headers, PartitionedQueryExecutionInfo, QueryRequest, SqlQuerySpec};
use crate::log_event;
use crate::observability::Event;

use super::retry::execute_with_retry;
use super::QueryClient;

/// Query features this pipeline can execute, advertised on plan requests
pub const SUPPORTED_QUERY_FEATURES: &str =
    "Aggregate, CompositeAggregate, MultipleOrderBy, OffsetAndLimit, OrderBy, Top";

/// Query plan format version understood by this pipeline
pub const QUERY_VERSION: &str = "1.4";

/// Asks the gateway how a query decomposes across partitions
pub struct QueryPlanRetriever<'a> {
    client: &'a QueryClient,
}

impl<'a> QueryPlanRetriever<'a> {
    pub fn new(client: &'a QueryClient) -> Self {
        Self { client }
    }

    /// Builds the plan request with the capability headers attached
    pub fn plan_request(&self, query: &SqlQuerySpec, resource_link: &str) -> QueryRequest {
        QueryRequest::new(resource_link, query.clone())
            .with_header(headers::IS_QUERY_PLAN_REQUEST, "True")
            .with_header(
                headers::SUPPORTED_QUERY_FEATURES,
                self.client.supported_query_features.as_str(),
            )
            .with_header(headers::QUERY_VERSION, self.client.query_version.as_str())
            .with_header(headers::CONTENT_TYPE, "application/query+json")
    }

    /// Fetches, parses and validates the plan
    ///
    /// Retried under a fresh policy from the client's retry factory.
    pub async fn get_query_plan(
        &self,
        query: &SqlQuerySpec,
        resource_link: &str,
    ) -> QueryResult<PartitionedQueryExecutionInfo> {
        let mut request = self.plan_request(query, resource_link);
        let mut policy = self.client.retry_policy_factory.create();
        let mut retries = -1;
        let gateway = self.client.plan_gateway.as_ref();

        let payload = execute_with_retry(policy.as_mut(), &mut request, &mut retries, |req| {
            async move { gateway.fetch_query_plan(&req).await }
        })
        .await?;

        let plan = PartitionedQueryExecutionInfo::parse(&payload)?;
        plan.query_info.validate()?;

        self.client.metrics.increment_query_plans_retrieved();
        log_event!(
            Event::QueryPlanRetrieved,
            resource = %resource_link,
            retries,
            query_ranges = plan.query_ranges.len()
        );
        Ok(plan)
    }
}
