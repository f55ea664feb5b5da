//! Cross-partition aggregation
//!
//! Each partition returns a partial aggregate. The component drains the whole inner
//! stream, folds every partial into one [`Aggregator`] and emits a single page holding
//! the result. Partials arrive either bare or wrapped as `[{"item": v}]`; averages arrive
//! as `{"sum", "count"}` and min/max as `{"min"|"max", "count"}`.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::{QueryError, QueryResult};
use crate::model::{merge_query_metrics, AggregateOperator, FeedResponse};

use super::comparator::ItemComparator;
use super::component::{ExecutionComponent, PageFuture};

/// Property name of the aggregate in a non-`VALUE` projection
pub const AGGREGATE_ALIAS: &str = "$1";

/// Streaming reducer over partial aggregates
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregator {
    Count { count: f64 },
    Sum { sum: f64, defined: bool },
    Average { sum: f64, count: f64 },
    Min { min: Option<Value> },
    Max { max: Option<Value> },
}

impl Aggregator {
    pub fn new(operator: AggregateOperator) -> Self {
        match operator {
            AggregateOperator::Count => Aggregator::Count { count: 0.0 },
            AggregateOperator::Sum => Aggregator::Sum {
                sum: 0.0,
                defined: true,
            },
            AggregateOperator::Average => Aggregator::Average {
                sum: 0.0,
                count: 0.0,
            },
            AggregateOperator::Min => Aggregator::Min { min: None },
            AggregateOperator::Max => Aggregator::Max { max: None },
        }
    }

    /// Folds one partial in; `None` is an undefined partial and is ignored
    pub fn aggregate(&mut self, partial: Option<&Value>) -> QueryResult<()> {
        let Some(partial) = partial else {
            return Ok(());
        };

        match self {
            Aggregator::Count { count } => {
                *count += partial.as_f64().ok_or_else(|| {
                    QueryError::invariant(format!("count partial {} is not a number", partial))
                })?;
            }
            Aggregator::Sum { sum, defined } => match partial.as_f64() {
                Some(n) => *sum += n,
                // A non-numeric value poisons the sum
                None => *defined = false,
            },
            Aggregator::Average { sum, count } => {
                let (partial_sum, partial_count) = match partial {
                    Value::Object(map) => (
                        map.get("sum").and_then(Value::as_f64),
                        map.get("count").and_then(Value::as_f64),
                    ),
                    other => (other.as_f64(), Some(1.0)),
                };
                match (partial_sum, partial_count) {
                    (Some(s), Some(c)) => {
                        *sum += s;
                        *count += c;
                    }
                    (None, Some(c)) if c == 0.0 => {}
                    _ => {
                        return Err(QueryError::invariant(format!(
                            "malformed average partial {}",
                            partial
                        )))
                    }
                }
            }
            Aggregator::Min { min } => {
                if let Some(value) = extremum_partial(partial, "min") {
                    if replaces(min.as_ref(), value, Ordering::Less)? {
                        *min = Some(value.clone());
                    }
                }
            }
            Aggregator::Max { max } => {
                if let Some(value) = extremum_partial(partial, "max") {
                    if replaces(max.as_ref(), value, Ordering::Greater)? {
                        *max = Some(value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Final value, or `None` when the aggregate is undefined
    pub fn result(&self) -> Option<Value> {
        match self {
            Aggregator::Count { count } => Some(number_value(*count)),
            Aggregator::Sum { sum, defined } => defined.then(|| number_value(*sum)),
            Aggregator::Average { sum, count } => {
                (*count > 0.0).then(|| number_value(*sum / *count))
            }
            Aggregator::Min { min } => min.clone(),
            Aggregator::Max { max } => max.clone(),
        }
    }
}

/// Unwraps `{"min": v, "count": n}`; a zero count contributes nothing
fn extremum_partial<'a>(partial: &'a Value, key: &str) -> Option<&'a Value> {
    match partial {
        Value::Object(map) if map.contains_key("count") => {
            let count = map.get("count").and_then(Value::as_f64).unwrap_or(0.0);
            if count > 0.0 {
                map.get(key)
            } else {
                None
            }
        }
        other => Some(other),
    }
}

fn replaces(current: Option<&Value>, candidate: &Value, wins_when: Ordering) -> QueryResult<bool> {
    match current {
        None => Ok(true),
        Some(current) => {
            Ok(ItemComparator::new().compare(Some(candidate), Some(current))? == wins_when)
        }
    }
}

/// Integral results are emitted as integers
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// The partial carried by one result item
fn partial_value(item: &Value) -> Option<&Value> {
    let item = match item {
        Value::Array(values) => values.first()?,
        other => other,
    };
    match item {
        Value::Object(map) if map.contains_key("item") => map.get("item"),
        Value::Object(map) if map.is_empty() => None,
        other => Some(other),
    }
}

pub struct AggregateComponent {
    inner: Box<dyn ExecutionComponent>,
    aggregator: Aggregator,
    has_select_value: bool,
    done: bool,
}

impl AggregateComponent {
    pub fn new(
        inner: Box<dyn ExecutionComponent>,
        operator: AggregateOperator,
        has_select_value: bool,
    ) -> Self {
        Self {
            inner,
            aggregator: Aggregator::new(operator),
            has_select_value,
            done: false,
        }
    }

    async fn next_page_inner(&mut self) -> QueryResult<Option<FeedResponse>> {
        if self.done {
            return Ok(None);
        }

        let mut charge = 0.0;
        let mut metrics = HashMap::new();
        while let Some(page) = self.inner.next_page().await? {
            charge += page.request_charge;
            merge_query_metrics(&mut metrics, page.query_metrics);
            for item in &page.items {
                self.aggregator.aggregate(partial_value(item))?;
            }
        }
        self.done = true;

        let items = match self.aggregator.result() {
            Some(value) if self.has_select_value => vec![value],
            Some(value) => vec![json!({ AGGREGATE_ALIAS: value })],
            None => Vec::new(),
        };
        Ok(Some(
            FeedResponse::new(items)
                .with_request_charge(charge)
                .with_query_metrics(metrics),
        ))
    }
}

impl ExecutionComponent for AggregateComponent {
    fn next_page(&mut self) -> PageFuture<'_> {
        Box::pin(self.next_page_inner())
    }

    fn operator(&self) -> &'static str {
        "Aggregate"
    }

    fn inner(&self) -> Option<&dyn ExecutionComponent> {
        Some(self.inner.as_ref())
    }
}
