use crate::continuation::TakeContinuationToken;
use crate::error::QueryResult;
use crate::model::FeedResponse;

use super::component::{ExecutionComponent, PageFuture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeKind {
    Top,
    Limit,
}

/// Caps the total number of items returned by the inner stream
///
/// The last page is truncated to the remaining budget, and the inner stream is not
/// pulled again once the budget is spent.
pub struct TakeComponent {
    inner: Box<dyn ExecutionComponent>,
    kind: TakeKind,
    remaining: u32,
}

impl TakeComponent {
    /// Splits an inbound continuation into the remaining count and the inner token
    pub fn resume(count: u32, continuation: Option<&str>) -> QueryResult<(u32, Option<String>)> {
        match continuation {
            Some(token) => {
                let token = TakeContinuationToken::parse(token)?;
                Ok((token.limit_count, token.source_token))
            }
            None => Ok((count, None)),
        }
    }

    pub fn new(inner: Box<dyn ExecutionComponent>, kind: TakeKind, remaining: u32) -> Self {
        Self {
            inner,
            kind,
            remaining,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    async fn next_page_inner(&mut self) -> QueryResult<Option<FeedResponse>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let Some(mut page) = self.inner.next_page().await? else {
            return Ok(None);
        };

        page.items.truncate(self.remaining as usize);
        self.remaining -= page.items.len() as u32;

        page.continuation = match page.continuation.take() {
            Some(source) if self.remaining > 0 => {
                Some(TakeContinuationToken::new(self.remaining, Some(source)).to_json()?)
            }
            _ => None,
        };
        Ok(Some(page))
    }
}

impl ExecutionComponent for TakeComponent {
    fn next_page(&mut self) -> PageFuture<'_> {
        Box::pin(self.next_page_inner())
    }

    fn operator(&self) -> &'static str {
        match self.kind {
            TakeKind::Top => "Top",
            TakeKind::Limit => "Limit",
        }
    }

    fn inner(&self) -> Option<&dyn ExecutionComponent> {
        Some(self.inner.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::testing::PageList;
    use serde_json::json;

    fn numbered(sizes: &[usize]) -> PageList {
        let mut next = 0;
        PageList::new(
            sizes
                .iter()
                .map(|&n| {
                    let items = (next..next + n).map(|i| json!(i)).collect();
                    next += n;
                    items
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_truncates_final_page() {
        let mut take = TakeComponent::new(Box::new(numbered(&[3, 3, 3])), TakeKind::Top, 4);

        let first = take.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 3);
        let token = TakeContinuationToken::parse(first.continuation.as_deref().unwrap()).unwrap();
        assert_eq!(token.limit_count, 1);

        let second = take.next_page().await.unwrap().unwrap();
        assert_eq!(second.items, vec![json!(3)]);
        assert!(second.continuation.is_none());
        assert!(take.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stops_pulling_inner_when_exhausted() {
        let inner = numbered(&[2, 2, 2]);
        let pulls = inner.pulls();
        let mut take = TakeComponent::new(Box::new(inner), TakeKind::Limit, 2);

        take.next_page().await.unwrap();
        assert!(take.next_page().await.unwrap().is_none());
        assert_eq!(pulls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_budget_returns_nothing() {
        let mut take = TakeComponent::new(Box::new(numbered(&[1])), TakeKind::Top, 0);
        assert!(take.next_page().await.unwrap().is_none());
    }

    #[test]
    fn test_resume_reads_take_token() {
        let token = TakeContinuationToken::new(2, Some("src".into())).to_json().unwrap();
        assert_eq!(
            TakeComponent::resume(9, Some(&token)).unwrap(),
            (2, Some("src".to_string()))
        );
        assert!(TakeComponent::resume(9, Some("{}")).is_err());
    }
}
