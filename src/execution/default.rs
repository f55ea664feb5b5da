use std::sync::Arc;

use crate::error::QueryResult;
use crate::model::FeedResponse;

use super::component::{ExecutionComponent, PageFuture};
use super::fetcher::{Fetcher, Paginator};
use super::producer::{QueryPageExecutor, QueryTarget};

/// Runs the query as a single request stream
///
/// Without a range id the gateway routes the query; with one the query is pinned to that
/// partition. Continuations are the backend's own and pass through untouched.
pub struct DefaultExecutionContext {
    paginator: Paginator<QueryPageExecutor>,
}

impl DefaultExecutionContext {
    pub fn new(
        target: Arc<QueryTarget>,
        partition_key_range_id: Option<String>,
        continuation: Option<String>,
    ) -> Self {
        let page_size = target.page_size;
        let is_change_feed = target.is_change_feed;
        let executor = QueryPageExecutor::new(target, partition_key_range_id);
        let fetcher = Fetcher::new(executor, continuation, is_change_feed, None, page_size);
        Self {
            paginator: Paginator::new(fetcher),
        }
    }

    async fn next_page_inner(&mut self) -> QueryResult<Option<FeedResponse>> {
        self.paginator.next_page().await
    }
}

impl ExecutionComponent for DefaultExecutionContext {
    fn next_page(&mut self) -> PageFuture<'_> {
        Box::pin(self.next_page_inner())
    }

    fn operator(&self) -> &'static str {
        "Default"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::QueryClient;
    use crate::model::SqlQuerySpec;
    use crate::routing::PartitionKeyRange;
    use crate::simulator::InMemoryContainer;
    use serde_json::json;

    #[tokio::test]
    async fn test_pinned_to_one_range() {
        let container = Arc::new(InMemoryContainer::new(
            "dbs/db/colls/c",
            vec![
                PartitionKeyRange::new("0", "", "45"),
                PartitionKeyRange::new("1", "45", "FF"),
            ],
        ));
        container.insert(json!({"id": "a", "pk": "A"}));
        container.insert(json!({"id": "z", "pk": "Z"}));

        let target = Arc::new(
            QueryTarget::new(
                QueryClient::from_backend(container.clone()),
                container.resource_link(),
                container.resource_id(),
                SqlQuerySpec::new("SELECT * FROM c"),
            )
            .with_page_size(10),
        );
        let mut context = DefaultExecutionContext::new(target, Some("1".into()), None);

        let page = context.next_page().await.unwrap().unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0]["id"], "z");
        assert!(context.next_page().await.unwrap().is_none());
    }
}
