//! Scripted components for operator tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::error::QueryResult;
use crate::model::FeedResponse;

use super::component::{ExecutionComponent, PageFuture};

/// Replays a fixed list of pages
///
/// Page `i` carries continuation `"i+1"`; the last page carries none.
pub(crate) struct PageList {
    pages: Vec<Vec<Value>>,
    next: usize,
    charge: f64,
    pulls: Arc<AtomicUsize>,
}

impl PageList {
    pub(crate) fn new(pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages,
            next: 0,
            charge: 0.0,
            pulls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    pub(crate) fn pulls(&self) -> Arc<AtomicUsize> {
        self.pulls.clone()
    }

    fn pull(&mut self) -> QueryResult<Option<FeedResponse>> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        let Some(items) = self.pages.get(self.next).cloned() else {
            return Ok(None);
        };
        self.next += 1;
        let continuation = (self.next < self.pages.len()).then(|| self.next.to_string());
        Ok(Some(
            FeedResponse::new(items)
                .with_continuation(continuation)
                .with_request_charge(self.charge),
        ))
    }
}

impl ExecutionComponent for PageList {
    fn next_page(&mut self) -> PageFuture<'_> {
        let page = self.pull();
        Box::pin(async move { page })
    }

    fn operator(&self) -> &'static str {
        "PageList"
    }
}
