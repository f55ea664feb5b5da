//! Unordered fan-out: partitions drained one after another in range order

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::continuation::CompositeContinuationToken;
use crate::error::{QueryError, QueryResult};
use crate::model::{FeedResponse, QueryMetrics};
use crate::log_event;
use crate::observability::{Event, PipelineMetrics};
use crate::routing::{sort_by_min, PartitionKeyRange};

use super::charge::RequestChargeTracker;
use super::component::{ExecutionComponent, PageFuture};
use super::producer::{DocumentProducer, ProducerEvent, ProducerPage, ProducerSeed, QueryTarget, SplitHandling};
use super::resume::find_target_range_and_extract_continuation_tokens;

/// Concatenates partition results in ascending range order
///
/// A range is not touched until the one before it, including any ranges it split into,
/// is exhausted. Empty pages are folded into the next visible page unless the caller asked
/// to see them. The outgoing continuation is a [`CompositeContinuationToken`] computed with
/// one page of lookahead.
pub struct ParallelSource {
    producers: VecDeque<DocumentProducer>,
    tracker: RequestChargeTracker,
    allow_empty_pages: bool,
    lookahead: Option<ProducerPage>,
    filtered_metrics: HashMap<String, QueryMetrics>,
    emitted_any: bool,
    metrics: Arc<PipelineMetrics>,
}

impl ParallelSource {
    pub fn new(
        target: Arc<QueryTarget>,
        mut ranges: Vec<PartitionKeyRange>,
        continuation: Option<&str>,
        allow_empty_pages: bool,
        top: Option<u32>,
    ) -> QueryResult<Self> {
        sort_by_min(&mut ranges);
        let seeds = match continuation {
            Some(token) => {
                let token = CompositeContinuationToken::parse(token)?;
                find_target_range_and_extract_continuation_tokens(&ranges, &token)?
            }
            None => ranges
                .into_iter()
                .map(|range| ProducerSeed::new(range, None))
                .collect(),
        };

        let metrics = target.client.metrics.clone();
        let producers = seeds
            .into_iter()
            .map(|seed| DocumentProducer::new(target.clone(), seed, SplitHandling::Flatten, top))
            .collect();

        Ok(Self {
            producers,
            tracker: RequestChargeTracker::new(),
            allow_empty_pages,
            lookahead: None,
            filtered_metrics: HashMap::new(),
            emitted_any: false,
            metrics,
        })
    }

    async fn next_page_inner(&mut self) -> QueryResult<Option<FeedResponse>> {
        let current = match self.lookahead.take() {
            Some(page) => page,
            None => match self.next_visible().await? {
                Some(page) => page,
                None => return Ok(self.final_empty_page()),
            },
        };

        // Look one page ahead so the token can name the next range when this one is done
        let next = self.next_visible().await?;
        let continuation = match (&current.page.continuation, &next) {
            (Some(token), _) => Some(
                CompositeContinuationToken::for_partition(Some(token.clone()), &current.range)
                    .to_json()?,
            ),
            (None, Some(next)) => {
                Some(CompositeContinuationToken::for_partition(None, &next.range).to_json()?)
            }
            (None, None) => None,
        };
        self.lookahead = next;

        let mut page = current.page;
        page.continuation = continuation;
        page.request_charge += self.tracker.get_and_reset_charge();
        page.merge_query_metrics(std::mem::take(&mut self.filtered_metrics));
        self.emitted_any = true;
        Ok(Some(page))
    }

    /// Next page the caller should see, folding filtered pages into the tracker
    async fn next_visible(&mut self) -> QueryResult<Option<ProducerPage>> {
        loop {
            let Some(producer) = self.producers.front_mut() else {
                return Ok(None);
            };
            match producer.next_event().await? {
                Some(ProducerEvent::Page(page)) => {
                    if page.page.is_empty() && !self.allow_empty_pages {
                        self.filter(page);
                        continue;
                    }
                    return Ok(Some(page));
                }
                Some(ProducerEvent::Split(_)) => {
                    return Err(QueryError::invariant(
                        "flattening producer surfaced a split",
                    ));
                }
                None => {
                    self.producers.pop_front();
                }
            }
        }
    }

    fn filter(&mut self, page: ProducerPage) {
        self.tracker.add_charge(page.page.request_charge);
        self.metrics.increment_empty_pages_filtered();
        log_event!(
            Event::PageFiltered,
            range = %page.range.id,
            charge = page.page.request_charge
        );
        crate::model::merge_query_metrics(&mut self.filtered_metrics, page.page.query_metrics);
    }

    /// One empty page carrying the billed charge when nothing was ever visible
    fn final_empty_page(&mut self) -> Option<FeedResponse> {
        if self.emitted_any {
            return None;
        }
        self.emitted_any = true;
        let mut page =
            FeedResponse::empty().with_request_charge(self.tracker.get_and_reset_charge());
        page.merge_query_metrics(std::mem::take(&mut self.filtered_metrics));
        Some(page)
    }
}

impl ExecutionComponent for ParallelSource {
    fn next_page(&mut self) -> PageFuture<'_> {
        Box::pin(self.next_page_inner())
    }

    fn operator(&self) -> &'static str {
        "Parallel"
    }
}
