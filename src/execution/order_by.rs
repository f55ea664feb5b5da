//! Globally ordered fan-out
//!
//! Every target range gets a slot holding one buffered page of rows. Empty slots are
//! refilled concurrently, at most one request in flight per slot, and the merge always
//! emits the smallest head row across slots, ties going to the slot with the lower range.
//! A split replaces a slot with one slot per child range, in place, so range order survives.
//! Only the first child resumes from the parent's backend token, so every child drops rows at
//! or before the last row the parent emitted.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::Value;

use crate::continuation::{CompositeContinuationToken, OrderByContinuationToken, OrderByItem};
use crate::error::{QueryError, QueryResult};
use crate::model::{merge_query_metrics, FeedResponse, QueryMetrics, SortOrder};
use crate::routing::{sort_by_min, PartitionKeyRange};

use super::charge::RequestChargeTracker;
use super::comparator::ItemComparator;
use super::component::{ExecutionComponent, PageFuture};
use super::producer::{DocumentProducer, ProducerEvent, ProducerSeed, QueryTarget, SplitHandling};
use super::resume::{find_target_range, TargetRanges};

/// Page size used when the caller lets the backend decide
pub const DEFAULT_ORDER_BY_PAGE_SIZE: usize = 100;

/// A row as returned by a rewritten order-by query
#[derive(Debug, Clone, Deserialize)]
pub struct OrderByRow {
    #[serde(rename = "_rid", default)]
    pub rid: String,
    #[serde(rename = "orderByItems")]
    pub order_by_items: Vec<OrderByItem>,
    #[serde(default)]
    pub payload: Value,
}

/// Drops rows a previous execution already emitted
#[derive(Debug, Clone)]
enum ResumeFilter {
    Pass,
    /// Range before the resume range: ties were already emitted
    Left(Vec<OrderByItem>),
    /// Range after the resume range: ties were not emitted yet
    Right(Vec<OrderByItem>),
    Target {
        items: Vec<OrderByItem>,
        rid: String,
        skip_count: u32,
    },
}

impl ResumeFilter {
    fn admits(
        &mut self,
        row: &OrderByRow,
        comparator: ItemComparator,
        orders: &[SortOrder],
    ) -> QueryResult<bool> {
        let admitted = match self {
            ResumeFilter::Pass => return Ok(true),
            ResumeFilter::Left(last) => {
                comparator.compare_items(&row.order_by_items, last, orders)? == Ordering::Greater
            }
            ResumeFilter::Right(last) => {
                comparator.compare_items(&row.order_by_items, last, orders)? != Ordering::Less
            }
            ResumeFilter::Target {
                items,
                rid,
                skip_count,
            } => match comparator.compare_items(&row.order_by_items, items, orders)? {
                Ordering::Less => false,
                Ordering::Greater => true,
                Ordering::Equal => match comparator.compare_rids(&row.rid, rid.as_str(), orders) {
                    Ordering::Less => false,
                    Ordering::Greater => true,
                    Ordering::Equal if *skip_count > 0 => {
                        *skip_count -= 1;
                        false
                    }
                    Ordering::Equal => true,
                },
            },
        };
        // Rows arrive sorted, so everything after the first admitted row is new
        if admitted {
            *self = ResumeFilter::Pass;
        }
        Ok(admitted)
    }
}

#[derive(Debug)]
struct BufferedRow {
    row: OrderByRow,
    /// Continuation the row's page was requested with
    fetched_with: Option<String>,
}

enum FillOutcome {
    Ready,
    Split(Vec<ProducerSeed>),
}

struct OrderBySlot {
    range: PartitionKeyRange,
    producer: DocumentProducer,
    buffer: VecDeque<BufferedRow>,
    filter: ResumeFilter,
    /// Order-by values and rid of the last row emitted from this slot
    last_emitted: Option<(Vec<OrderByItem>, String)>,
    exhausted: bool,
    query_metrics: HashMap<String, QueryMetrics>,
}

impl OrderBySlot {
    fn new(
        target: &Arc<QueryTarget>,
        seed: ProducerSeed,
        filter: ResumeFilter,
        top: Option<u32>,
    ) -> Self {
        Self {
            range: seed.range.clone(),
            producer: DocumentProducer::new(target.clone(), seed, SplitHandling::Surface, top),
            buffer: VecDeque::new(),
            filter,
            last_emitted: None,
            exhausted: false,
            query_metrics: HashMap::new(),
        }
    }

    /// Filter for a child range replacing this slot after a split
    fn child_filter(&self) -> ResumeFilter {
        match &self.last_emitted {
            // The buffer is empty when a split surfaces, so every admitted row was emitted
            Some((items, rid)) => ResumeFilter::Target {
                items: items.clone(),
                rid: rid.clone(),
                skip_count: 1,
            },
            None => self.filter.clone(),
        }
    }

    fn needs_fill(&self) -> bool {
        self.buffer.is_empty() && !self.exhausted
    }

    /// Fetches pages until a row survives the resume filter or the range is exhausted
    async fn fill(
        &mut self,
        tracker: &RequestChargeTracker,
        comparator: ItemComparator,
        orders: &[SortOrder],
    ) -> QueryResult<FillOutcome> {
        while self.needs_fill() {
            match self.producer.next_event().await? {
                None => self.exhausted = true,
                Some(ProducerEvent::Split(children)) => {
                    self.exhausted = true;
                    return Ok(FillOutcome::Split(children));
                }
                Some(ProducerEvent::Page(produced)) => {
                    tracker.add_charge(produced.page.request_charge);
                    merge_query_metrics(&mut self.query_metrics, produced.page.query_metrics);
                    for item in produced.page.items {
                        let row: OrderByRow = serde_json::from_value(item)?;
                        if row.order_by_items.len() != orders.len() {
                            return Err(QueryError::invariant(format!(
                                "row has {} order-by values, query has {}",
                                row.order_by_items.len(),
                                orders.len()
                            )));
                        }
                        if self.filter.admits(&row, comparator, orders)? {
                            self.buffer.push_back(BufferedRow {
                                row,
                                fetched_with: produced.fetched_with.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(FillOutcome::Ready)
    }
}

pub struct OrderBySource {
    target: Arc<QueryTarget>,
    slots: Vec<OrderBySlot>,
    orders: Vec<SortOrder>,
    comparator: ItemComparator,
    tracker: RequestChargeTracker,
    top: Option<u32>,
    /// Resume point after the most recently emitted row
    last: Option<OrderByContinuationToken>,
    emitted_any: bool,
    done: bool,
}

impl OrderBySource {
    pub fn new(
        target: Arc<QueryTarget>,
        mut ranges: Vec<PartitionKeyRange>,
        continuation: Option<&str>,
        orders: Vec<SortOrder>,
        top: Option<u32>,
    ) -> QueryResult<Self> {
        if orders.is_empty() {
            return Err(QueryError::invariant("order-by source built without sort orders"));
        }
        sort_by_min(&mut ranges);

        let mut last = None;
        let slots = match continuation {
            None => ranges
                .into_iter()
                .map(|range| {
                    OrderBySlot::new(&target, ProducerSeed::new(range, None), ResumeFilter::Pass, top)
                })
                .collect(),
            Some(token) => {
                let token = OrderByContinuationToken::parse(token)?;
                if token.order_by_items.len() != orders.len() {
                    return Err(QueryError::malformed_continuation(format!(
                        "token has {} order-by values, query has {}",
                        token.order_by_items.len(),
                        orders.len()
                    )));
                }
                let TargetRanges {
                    left,
                    target: resume,
                    right,
                } = find_target_range(&ranges, &token.composite_token.range)?;

                let items = token.order_by_items.clone();
                let mut slots = Vec::with_capacity(left.len() + right.len() + 1);
                for range in left {
                    let filter = ResumeFilter::Left(items.clone());
                    slots.push(OrderBySlot::new(&target, ProducerSeed::new(range, None), filter, top));
                }
                let filter = ResumeFilter::Target {
                    items: items.clone(),
                    rid: token.rid.clone(),
                    skip_count: token.skip_count,
                };
                let seed = ProducerSeed::new(resume, token.composite_token.token.clone());
                slots.push(OrderBySlot::new(&target, seed, filter, top));
                for range in right {
                    let filter = ResumeFilter::Right(items.clone());
                    slots.push(OrderBySlot::new(&target, ProducerSeed::new(range, None), filter, top));
                }
                last = Some(token);
                slots
            }
        };

        Ok(Self {
            target,
            slots,
            orders,
            comparator: ItemComparator::new(),
            tracker: RequestChargeTracker::new(),
            top,
            last,
            emitted_any: false,
            done: false,
        })
    }

    fn page_size(&self) -> usize {
        usize::try_from(self.target.page_size)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_ORDER_BY_PAGE_SIZE)
    }

    async fn next_page_inner(&mut self) -> QueryResult<Option<FeedResponse>> {
        if self.done {
            return Ok(None);
        }

        let page_size = self.page_size();
        let mut items = Vec::with_capacity(page_size);
        while items.len() < page_size {
            self.fill_all().await?;
            let Some(index) = self.min_slot()? else {
                break;
            };
            let buffered = self.slots[index]
                .buffer
                .pop_front()
                .ok_or_else(|| QueryError::invariant("selected slot has no buffered row"))?;
            self.record_emission(index, &buffered);
            items.push(buffered.row.payload);
        }

        // Refill so an exhausted query reports no continuation on its last page
        self.fill_all().await?;
        let has_more = self.slots.iter().any(|s| !s.buffer.is_empty());
        if !has_more {
            self.done = true;
            if items.is_empty() && self.emitted_any {
                return Ok(None);
            }
        }

        let continuation = match (&self.last, has_more) {
            (Some(last), true) => Some(last.to_json()?),
            _ => None,
        };
        let mut page = FeedResponse::new(items)
            .with_continuation(continuation)
            .with_request_charge(self.tracker.get_and_reset_charge());
        for slot in &mut self.slots {
            page.merge_query_metrics(std::mem::take(&mut slot.query_metrics));
        }
        self.emitted_any = true;
        Ok(Some(page))
    }

    /// Refills every empty slot concurrently and splices in split children
    async fn fill_all(&mut self) -> QueryResult<()> {
        loop {
            let Self {
                slots,
                tracker,
                orders,
                comparator,
                ..
            } = self;
            let comparator = *comparator;
            let tracker = &*tracker;
            let orders = orders.as_slice();

            let fills = slots
                .iter_mut()
                .enumerate()
                .filter(|(_, slot)| slot.needs_fill())
                .map(|(index, slot)| async move {
                    (index, slot.fill(tracker, comparator, orders).await)
                });
            let outcomes = join_all(fills).await;

            let mut splits = Vec::new();
            for (index, outcome) in outcomes {
                if let FillOutcome::Split(children) = outcome? {
                    splits.push((index, children));
                }
            }
            if splits.is_empty() {
                return Ok(());
            }

            // Back to front so earlier indices stay valid
            splits.sort_by(|a, b| b.0.cmp(&a.0));
            for (index, children) in splits {
                let filter = self.slots[index].child_filter();
                let mut metrics = std::mem::take(&mut self.slots[index].query_metrics);
                let mut replacements: Vec<OrderBySlot> = children
                    .into_iter()
                    .map(|seed| OrderBySlot::new(&self.target, seed, filter.clone(), self.top))
                    .collect();
                if let Some(first) = replacements.first_mut() {
                    merge_query_metrics(&mut first.query_metrics, std::mem::take(&mut metrics));
                }
                self.slots.splice(index..=index, replacements);
            }
        }
    }

    fn min_slot(&self) -> QueryResult<Option<usize>> {
        let mut best: Option<(usize, &BufferedRow)> = None;
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(head) = slot.buffer.front() else {
                continue;
            };
            best = match best {
                None => Some((index, head)),
                Some((best_index, best_head)) => {
                    let ordering = self.comparator.compare_items(
                        &head.row.order_by_items,
                        &best_head.row.order_by_items,
                        &self.orders,
                    )?;
                    if ordering == Ordering::Less {
                        Some((index, head))
                    } else {
                        Some((best_index, best_head))
                    }
                }
            };
        }
        Ok(best.map(|(index, _)| index))
    }

    fn record_emission(&mut self, index: usize, emitted: &BufferedRow) {
        let slot = &mut self.slots[index];
        slot.last_emitted = Some((emitted.row.order_by_items.clone(), emitted.row.rid.clone()));
        let range = slot.range.to_range();
        let repeat = self.last.as_ref().is_some_and(|last| {
            last.composite_token.range.min == range.min
                && last.rid == emitted.row.rid
                && last.order_by_items == emitted.row.order_by_items
        });
        let skip_count = match (&self.last, repeat) {
            (Some(last), true) => last.skip_count + 1,
            _ => 1,
        };
        self.last = Some(OrderByContinuationToken {
            composite_token: CompositeContinuationToken::new(emitted.fetched_with.clone(), range),
            order_by_items: emitted.row.order_by_items.clone(),
            rid: emitted.row.rid.clone(),
            skip_count,
        });
    }
}

impl ExecutionComponent for OrderBySource {
    fn next_page(&mut self) -> PageFuture<'_> {
        Box::pin(self.next_page_inner())
    }

    fn operator(&self) -> &'static str {
        "OrderBy"
    }
}
