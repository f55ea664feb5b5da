//! Pipeline assembly from a query plan
//!
//! The plan is turned into an ordered list of [`OperatorSpec`]s, innermost first. An
//! inbound continuation is peeled outermost-first, each operator taking its own state
//! and handing the wrapped token to the operator beneath it. The partitioned source is
//! then built from whatever token is left, and the operators are wrapped around it
//! innermost-first. Outgoing tokens therefore nest in the same order.
//!
//! Operator order: source, Aggregate, Limit(offset + limit), Skip, Top, Limit(limit).
//! The offset-aware limit only appears with OFFSET; a bare LIMIT is the outermost stage.
//!
//! With OFFSET, the limit sits beneath Skip rather than outside it. It counts rows before
//! they are skipped, so its budget is offset + limit and matches the LIMIT the rewritten
//! per-partition query carries. The wire token for `OFFSET x LIMIT y` is therefore
//! `{"offset", "sourceToken": {"limitCount", "sourceToken": <source token>}}`, with the
//! Limit token inside the Offset token. A Limit-outermost chain would nest them the other
//! way round, and tokens from one layout are not accepted by the other. See DESIGN.md,
//! "Decisions on open questions".

use std::sync::Arc;

use crate::config::FeedOptions;
use crate::error::{QueryError, QueryResult};
use crate::model::{AggregateOperator, PartitionedQueryExecutionInfo, QueryInfo, SqlQuerySpec};
use crate::log_event;
use crate::observability::Event;
use crate::routing::PartitionKeyRange;

use super::aggregate::AggregateComponent;
use super::component::{describe_chain, ExecutionComponent, PageFuture};
use super::order_by::OrderBySource;
use super::parallel::ParallelSource;
use super::producer::QueryTarget;
use super::skip::SkipComponent;
use super::source::PartitionedSource;
use super::take::{TakeComponent, TakeKind};

/// One post-processing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSpec {
    Aggregate {
        operator: AggregateOperator,
        has_select_value: bool,
    },
    Skip {
        offset: u32,
    },
    Take {
        kind: TakeKind,
        count: u32,
    },
}

impl OperatorSpec {
    /// Stages required by the plan, innermost first
    pub fn from_query_info(info: &QueryInfo) -> Vec<OperatorSpec> {
        let mut specs = Vec::new();

        if let Some(&operator) = info.aggregates.first() {
            specs.push(OperatorSpec::Aggregate {
                operator,
                has_select_value: info.has_select_value,
            });
        }
        if let Some(offset) = info.offset {
            if let Some(limit) = info.limit {
                specs.push(OperatorSpec::Take {
                    kind: TakeKind::Limit,
                    count: offset.saturating_add(limit),
                });
            }
            specs.push(OperatorSpec::Skip { offset });
        }
        if let Some(top) = info.top {
            specs.push(OperatorSpec::Take {
                kind: TakeKind::Top,
                count: top,
            });
        }
        if let (None, Some(limit)) = (info.offset, info.limit) {
            specs.push(OperatorSpec::Take {
                kind: TakeKind::Limit,
                count: limit,
            });
        }
        specs
    }

    /// This stage's state from an inbound token, plus the token for the stage beneath
    fn resume(&self, continuation: Option<&str>) -> QueryResult<(u32, Option<String>)> {
        match *self {
            OperatorSpec::Aggregate { .. } => Ok((0, continuation.map(str::to_string))),
            OperatorSpec::Skip { offset } => SkipComponent::resume(offset, continuation),
            OperatorSpec::Take { count, .. } => TakeComponent::resume(count, continuation),
        }
    }

    fn wrap(&self, inner: Box<dyn ExecutionComponent>, state: u32) -> Box<dyn ExecutionComponent> {
        match *self {
            OperatorSpec::Aggregate {
                operator,
                has_select_value,
            } => Box::new(AggregateComponent::new(inner, operator, has_select_value)),
            OperatorSpec::Skip { .. } => Box::new(SkipComponent::new(inner, state)),
            OperatorSpec::Take { kind, .. } => Box::new(TakeComponent::new(inner, kind, state)),
        }
    }
}

/// Page size sent to partitions and used for outward pages
///
/// Never larger than TOP; a dynamic (non-positive) request size defers to TOP when present.
pub fn outward_page_size(requested: i32, top: Option<u32>) -> i32 {
    match top.map(|t| i32::try_from(t).unwrap_or(i32::MAX)) {
        Some(top) if requested <= 0 || top < requested => top,
        _ => requested,
    }
}

pub struct PipelinedExecutionContext {
    root: Box<dyn ExecutionComponent>,
    page_size: i32,
    operators: Vec<OperatorSpec>,
}

impl PipelinedExecutionContext {
    #[tracing::instrument(level = "debug", skip_all, fields(ranges = ranges.len()))]
    pub fn new(
        target: &QueryTarget,
        plan: &PartitionedQueryExecutionInfo,
        ranges: Vec<PartitionKeyRange>,
        options: &FeedOptions,
    ) -> QueryResult<Self> {
        let info = &plan.query_info;
        info.validate()?;
        if ranges.is_empty() {
            return Err(QueryError::invariant("pipeline built with no target ranges"));
        }

        let page_size = outward_page_size(options.max_item_count, info.top);
        let producer_top = if info.has_aggregates() {
            None
        } else {
            info.top
                .or(info.limit)
                .map(|n| n.saturating_add(info.offset.unwrap_or(0)))
        };
        let target = Arc::new(QueryTarget {
            query: Self::partition_query(&target.query, plan),
            page_size,
            populate_query_metrics: options.populate_query_metrics,
            ..target.clone()
        });

        let operators = OperatorSpec::from_query_info(info);

        let mut token = options
            .request_continuation
            .clone()
            .filter(|c| !c.is_empty());
        let mut states = Vec::with_capacity(operators.len());
        for spec in operators.iter().rev() {
            let (state, inner) = spec.resume(token.as_deref())?;
            states.push(state);
            token = inner;
        }
        states.reverse();

        let source: PartitionedSource = if info.has_order_by() {
            OrderBySource::new(
                target,
                ranges,
                token.as_deref(),
                info.order_by.clone(),
                producer_top,
            )?
            .into()
        } else {
            ParallelSource::new(
                target,
                ranges,
                token.as_deref(),
                options.allow_empty_pages,
                producer_top,
            )?
            .into()
        };

        let mut root: Box<dyn ExecutionComponent> = Box::new(source);
        for (spec, state) in operators.iter().zip(states) {
            root = spec.wrap(root, state);
        }

        let chain = describe_chain(root.as_ref()).join("<-");
        log_event!(Event::PipelineAssembled, chain = %chain, page_size);

        Ok(Self {
            root,
            page_size,
            operators,
        })
    }

    pub fn page_size(&self) -> i32 {
        self.page_size
    }

    pub fn operator_specs(&self) -> &[OperatorSpec] {
        &self.operators
    }

    /// Operator names, outermost first
    pub fn operators(&self) -> Vec<&'static str> {
        describe_chain(self.root.as_ref())
    }

    /// Query text sent to partitions for `plan`
    pub fn partition_query(query: &SqlQuerySpec, plan: &PartitionedQueryExecutionInfo) -> SqlQuerySpec {
        match plan.query_info.formatted_rewritten_query() {
            Some(text) => query.with_query_text(text),
            None => query.clone(),
        }
    }
}

impl ExecutionComponent for PipelinedExecutionContext {
    fn next_page(&mut self) -> PageFuture<'_> {
        self.root.next_page()
    }

    fn operator(&self) -> &'static str {
        "Pipelined"
    }

    fn inner(&self) -> Option<&dyn ExecutionComponent> {
        Some(self.root.as_ref())
    }
}
