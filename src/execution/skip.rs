use crate::continuation::OffsetContinuationToken;
use crate::error::QueryResult;
use crate::model::FeedResponse;

use super::component::{ExecutionComponent, PageFuture};

/// Drops the first `offset` items of the inner stream
pub struct SkipComponent {
    inner: Box<dyn ExecutionComponent>,
    remaining: u32,
}

impl SkipComponent {
    /// Splits an inbound continuation into the remaining skip count and the inner token
    pub fn resume(offset: u32, continuation: Option<&str>) -> QueryResult<(u32, Option<String>)> {
        match continuation {
            Some(token) => {
                let token = OffsetContinuationToken::parse(token)?;
                Ok((token.offset, token.source_token))
            }
            None => Ok((offset, None)),
        }
    }

    pub fn new(inner: Box<dyn ExecutionComponent>, remaining: u32) -> Self {
        Self { inner, remaining }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    async fn next_page_inner(&mut self) -> QueryResult<Option<FeedResponse>> {
        let Some(mut page) = self.inner.next_page().await? else {
            return Ok(None);
        };

        let skipped = page.items.len().min(self.remaining as usize);
        page.items.drain(..skipped);
        self.remaining -= skipped as u32;

        page.continuation = match page.continuation.take() {
            Some(source) => {
                Some(OffsetContinuationToken::new(self.remaining, Some(source)).to_json()?)
            }
            None => None,
        };
        Ok(Some(page))
    }
}

impl ExecutionComponent for SkipComponent {
    fn next_page(&mut self) -> PageFuture<'_> {
        Box::pin(self.next_page_inner())
    }

    fn operator(&self) -> &'static str {
        "Skip"
    }

    fn inner(&self) -> Option<&dyn ExecutionComponent> {
        Some(self.inner.as_ref())
    }
}
