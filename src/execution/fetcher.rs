//! Single-partition page fetching
//!
//! [`Fetcher`] issues one request at a time and owns the paging state for one partition:
//! the backend continuation, the remaining item budget and the page size derived from it.
//! [`Paginator`] exposes that as a lazy, strictly sequential sequence of pages.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::{QueryError, QueryResult};
use crate::model::{FeedResponse, QueryRequest};

/// Builds and sends the requests for one partition
pub trait PageExecutor: Send {
    fn create_request(&self, continuation: Option<String>, page_size: i32) -> QueryRequest;

    fn execute_request<'a>(
        &'a mut self,
        request: QueryRequest,
    ) -> Pin<Box<dyn Future<Output = QueryResult<FeedResponse>> + Send + 'a>>;
}

pub struct Fetcher<E> {
    executor: E,
    continuation: Option<String>,
    is_change_feed: bool,
    /// Remaining item budget, `None` when unbounded
    top: Option<u32>,
    requested_page_size: i32,
    max_item_count: i32,
    should_fetch_more: bool,
}

impl<E: PageExecutor> Fetcher<E> {
    pub fn new(
        executor: E,
        continuation: Option<String>,
        is_change_feed: bool,
        top: Option<u32>,
        max_item_count: i32,
    ) -> Self {
        Self {
            executor,
            continuation: continuation.filter(|c| !c.is_empty()),
            is_change_feed,
            top,
            requested_page_size: max_item_count,
            max_item_count: clamp_page_size(max_item_count, top),
            should_fetch_more: top != Some(0),
        }
    }

    pub fn should_fetch_more(&self) -> bool {
        self.should_fetch_more
    }

    /// Continuation the next request will be sent with
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    pub fn top(&self) -> Option<u32> {
        self.top
    }

    pub fn max_item_count(&self) -> i32 {
        self.max_item_count
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Fetches the next page
    ///
    /// Calling this after [`should_fetch_more`](Self::should_fetch_more) turned false
    /// is a construction bug and fails with an invariant violation.
    pub async fn next_page(&mut self) -> QueryResult<FeedResponse> {
        if !self.should_fetch_more {
            return Err(QueryError::invariant(
                "next_page called on an exhausted fetcher",
            ));
        }

        let request = self
            .executor
            .create_request(self.continuation.clone(), self.max_item_count);
        let mut page = self.executor.execute_request(request).await?;
        self.update_state(&mut page);
        Ok(page)
    }

    fn update_state(&mut self, page: &mut FeedResponse) {
        self.continuation = page.continuation.clone().filter(|c| !c.is_empty());

        if let Some(top) = self.top {
            let received = page.items.len();
            if received > top as usize {
                tracing::warn!(
                    requested = top,
                    received,
                    "backend returned more items than requested; truncating"
                );
                page.items.truncate(top as usize);
            }
            let remaining = top.saturating_sub(page.items.len() as u32);
            self.top = Some(remaining);
            self.max_item_count = clamp_page_size(self.requested_page_size, self.top);
        }

        self.should_fetch_more = self.should_fetch_more
            && self.continuation.is_some()
            && self.top != Some(0)
            && !(self.is_change_feed && page.is_not_modified());
    }
}

/// Page size never exceeds the remaining budget; non-positive sizes defer to it
fn clamp_page_size(max_item_count: i32, top: Option<u32>) -> i32 {
    match top {
        Some(top) => {
            let top = i32::try_from(top).unwrap_or(i32::MAX);
            if max_item_count <= 0 {
                top
            } else {
                max_item_count.min(top)
            }
        }
        None => max_item_count,
    }
}

/// Lazy page sequence over one partition
///
/// Never has more than one request outstanding and never fetches ahead of the caller.
pub struct Paginator<E> {
    fetcher: Fetcher<E>,
}

impl<E: PageExecutor> Paginator<E> {
    pub fn new(fetcher: Fetcher<E>) -> Self {
        Self { fetcher }
    }

    pub fn has_more(&self) -> bool {
        self.fetcher.should_fetch_more()
    }

    pub fn continuation(&self) -> Option<&str> {
        self.fetcher.continuation()
    }

    pub fn fetcher(&self) -> &Fetcher<E> {
        &self.fetcher
    }

    pub async fn next_page(&mut self) -> QueryResult<Option<FeedResponse>> {
        if !self.fetcher.should_fetch_more() {
            return Ok(None);
        }
        self.fetcher.next_page().await.map(Some)
    }

    pub fn into_stream(self) -> BoxStream<'static, QueryResult<FeedResponse>>
    where
        E: 'static,
    {
        stream::try_unfold(self, |mut paginator| async move {
            let page = paginator.next_page().await?;
            Ok(page.map(|page| (page, paginator)))
        })
        .boxed()
    }
}
