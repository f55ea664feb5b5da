use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};

use crate::client::{
    BackendFuture, CollectionCache, CollectionMetadata, QueryExecutor, QueryPlanGateway,
    RangeCache,
};
use crate::continuation::OrderByItem;
use crate::error::{status, QueryError, QueryResult, ServiceError};
use crate::execution::{ItemComparator, QueryItem};
use crate::model::{
    headers, AggregateOperator, FeedResponse, PartitionedQueryExecutionInfo, QueryInfo,
    QueryRequest,
};
use crate::routing::{PartitionKeyRange, Range};

/// Page size served when a request leaves it to the backend
pub const DEFAULT_SERVED_PAGE_SIZE: usize = 100;

/// Uppercase hex of the `pk` property's bytes ("A" maps to "41")
pub fn effective_partition_key(document: &Value) -> String {
    let key = match document.get("pk") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    key.bytes().map(|b| format!("{:02X}", b)).collect()
}

type ScriptedResponse = Result<FeedResponse, ServiceError>;

struct ContainerState {
    documents: Vec<Value>,
    live: Vec<PartitionKeyRange>,
    retired: HashSet<String>,
    next_range_id: u64,
    scripted: HashMap<String, VecDeque<ScriptedResponse>>,
    gateway_failures: VecDeque<ServiceError>,
    page_charge: f64,
    requests: Vec<QueryRequest>,
    /// (range id, split point, request count that triggers it)
    scheduled_splits: Vec<(String, String, usize)>,
}

impl ContainerState {
    fn split(
        &mut self,
        range_id: &str,
        at: &str,
    ) -> QueryResult<(PartitionKeyRange, PartitionKeyRange)> {
        let position = self
            .live
            .iter()
            .position(|r| r.id == range_id)
            .ok_or_else(|| {
                QueryError::configuration(format!("range {} is not live", range_id))
            })?;
        let parent = self.live[position].clone();
        if at <= parent.min_inclusive.as_str() || at >= parent.max_exclusive.as_str() {
            return Err(QueryError::configuration(format!(
                "split point {} is outside range {} [{}, {})",
                at, parent.id, parent.min_inclusive, parent.max_exclusive
            )));
        }

        let left_id = self.next_range_id;
        self.next_range_id += 2;
        let left = PartitionKeyRange::new(left_id.to_string(), parent.min_inclusive.clone(), at)
            .with_parents(vec![parent.id.clone()]);
        let right =
            PartitionKeyRange::new((left_id + 1).to_string(), at, parent.max_exclusive.clone())
                .with_parents(vec![parent.id.clone()]);

        self.live
            .splice(position..=position, [left.clone(), right.clone()]);
        self.retired.insert(parent.id);
        Ok((left, right))
    }

    /// Applies scheduled splits whose trigger count has been reached
    fn apply_due_splits(&mut self) -> QueryResult<()> {
        let served = self.requests.len();
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled_splits)
            .into_iter()
            .partition(|(_, _, after)| *after <= served);
        self.scheduled_splits = pending;
        for (range_id, at, _) in due {
            let (left, right) = self.split(&range_id, &at)?;
            tracing::info!(range = %range_id, left = %left.id, right = %right.id, "split partition key range");
        }
        Ok(())
    }
}

/// Ordering key of one served row
enum RowKey {
    Raw { epk: String, id: String },
    OrderBy { items: Vec<OrderByItem>, rid: String },
}

struct Row {
    key: RowKey,
    document: Value,
}

/// A partitioned collection held in memory
pub struct InMemoryContainer {
    resource_link: String,
    resource_id: String,
    query_info: QueryInfo,
    state: Mutex<ContainerState>,
}

impl InMemoryContainer {
    pub fn new(resource_link: impl Into<String>, ranges: Vec<PartitionKeyRange>) -> Self {
        let resource_link = resource_link.into();
        let name = resource_link
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let next_range_id = ranges
            .iter()
            .filter_map(|r| r.id.parse::<u64>().ok())
            .max()
            .map_or(0, |id| id + 1);

        Self {
            resource_id: format!("{}-rid", name),
            resource_link,
            query_info: QueryInfo::default(),
            state: Mutex::new(ContainerState {
                documents: Vec::new(),
                live: ranges,
                retired: HashSet::new(),
                next_range_id,
                scripted: HashMap::new(),
                gateway_failures: VecDeque::new(),
                page_charge: 1.0,
                requests: Vec::new(),
                scheduled_splits: Vec::new(),
            }),
        }
    }

    /// Plan the gateway hands out, and the shape partitions serve rows in
    pub fn with_query_info(mut self, info: QueryInfo) -> Self {
        self.query_info = info;
        self
    }

    pub fn resource_link(&self) -> &str {
        &self.resource_link
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn state(&self) -> MutexGuard<'_, ContainerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, document: Value) {
        self.state().documents.push(document);
    }

    pub fn live_ranges(&self) -> Vec<PartitionKeyRange> {
        self.state().live.clone()
    }

    pub fn query_plan(&self) -> PartitionedQueryExecutionInfo {
        PartitionedQueryExecutionInfo {
            partitioned_query_execution_info_version: 2,
            query_info: self.query_info.clone(),
            query_ranges: vec![Range::full()],
        }
    }

    /// Every page request served so far, in arrival order
    pub fn request_log(&self) -> Vec<QueryRequest> {
        self.state().requests.clone()
    }

    /// Charge attached to computed pages
    pub fn set_page_charge(&self, charge: f64) {
        self.state().page_charge = charge;
    }

    /// Queues a response for the next request against `range_id`
    pub fn push_page(&self, range_id: &str, page: FeedResponse) {
        self.script(range_id, Ok(page));
    }

    /// Queues a failure for the next request against `range_id`
    pub fn inject_failure(&self, range_id: &str, error: ServiceError) {
        self.script(range_id, Err(error));
    }

    /// Queues a failure for the next request that names no range
    pub fn inject_gateway_failure(&self, error: ServiceError) {
        self.state().gateway_failures.push_back(error);
    }

    fn script(&self, range_id: &str, response: ScriptedResponse) {
        self.state()
            .scripted
            .entry(range_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// Splits a live range at `at`; the parent is retired and answers 410/1002 from now on
    pub fn split_range(
        &self,
        range_id: &str,
        at: &str,
    ) -> QueryResult<(PartitionKeyRange, PartitionKeyRange)> {
        self.state().split(range_id, at)
    }

    /// Splits `range_id` at `at` once `after_requests` page requests have been served
    pub fn schedule_split(&self, range_id: &str, at: &str, after_requests: usize) {
        self.state()
            .scheduled_splits
            .push((range_id.to_string(), at.to_string(), after_requests));
    }

    fn serve(&self, request: &QueryRequest) -> QueryResult<FeedResponse> {
        let mut state = self.state();
        state.apply_due_splits()?;
        state.requests.push(request.clone());

        let scope = match &request.partition_key_range_id {
            Some(id) => {
                if let Some(response) = state.scripted.get_mut(id).and_then(VecDeque::pop_front) {
                    return response.map_err(QueryError::from);
                }
                if state.retired.contains(id) {
                    return Err(ServiceError::partition_key_range_gone(id).into());
                }
                let range = state.live.iter().find(|r| &r.id == id).cloned().ok_or_else(|| {
                    ServiceError::new(
                        status::NOT_FOUND,
                        0,
                        format!("partition key range {} does not exist", id),
                    )
                })?;
                Some(range)
            }
            None => {
                if let Some(error) = state.gateway_failures.pop_front() {
                    return Err(error.into());
                }
                if state.live.len() > 1 || self.needs_pipeline() {
                    let plan = self.query_plan().to_json()?;
                    return Err(ServiceError::cross_partition_query_not_servable(plan).into());
                }
                None
            }
        };

        let documents: Vec<&Value> = state
            .documents
            .iter()
            .filter(|d| {
                scope
                    .as_ref()
                    .map_or(true, |r| r.contains(&effective_partition_key(d)))
            })
            .collect();

        let page = if self.query_info.has_aggregates() {
            self.aggregate_page(&documents)?
        } else {
            let rows = self.rows(&documents)?;
            let resume_after = match &request.continuation {
                Some(token) => Some(self.resume_key(&state.documents, token)?),
                None => None,
            };
            self.rows_page(rows, resume_after.as_ref(), request.max_item_count)?
        };

        let item_count = page.len();
        let mut page = page
            .with_request_charge(state.page_charge)
            .with_activity_id(request.activity_id)
            .with_header(headers::ITEM_COUNT, item_count.to_string());
        if request.header(headers::POPULATE_QUERY_METRICS) == Some("True") {
            let metrics = format!(
                "retrievedDocumentCount={};outputDocumentCount={};totalExecutionTimeInMs=0.5",
                documents.len(),
                page.len()
            );
            page = page.with_header(headers::QUERY_METRICS, metrics);
        }
        Ok(page)
    }

    fn needs_pipeline(&self) -> bool {
        let info = &self.query_info;
        info.has_top()
            || info.has_offset()
            || info.has_limit()
            || info.has_order_by()
            || info.has_aggregates()
    }

    fn aggregate_page(&self, documents: &[&Value]) -> QueryResult<FeedResponse> {
        match self.query_info.aggregates.as_slice() {
            [AggregateOperator::Count] => Ok(FeedResponse::new(vec![json!([
                {"item": documents.len()}
            ])])),
            other => Err(ServiceError::new(
                status::BAD_REQUEST,
                0,
                format!("in-memory container evaluates COUNT only, got {:?}", other),
            )
            .into()),
        }
    }

    fn row_key(&self, document: &Value) -> RowKey {
        let id = document_id(document);
        if self.query_info.has_order_by() {
            let items = self
                .query_info
                .order_by_expressions
                .iter()
                .map(|expr| match property_path(document, expr) {
                    Some(value) => OrderByItem::new(value.clone()),
                    None => OrderByItem::undefined(),
                })
                .collect();
            RowKey::OrderBy { items, rid: id }
        } else {
            RowKey::Raw {
                epk: effective_partition_key(document),
                id,
            }
        }
    }

    fn rows(&self, documents: &[&Value]) -> QueryResult<Vec<Row>> {
        let mut rows: Vec<Row> = documents
            .iter()
            .map(|d| Row {
                key: self.row_key(d),
                document: (*d).clone(),
            })
            .collect();

        // Non-scalar order-by values fail here so the sort below cannot
        for row in &rows {
            if let RowKey::OrderBy { items, .. } = &row.key {
                for item in items {
                    QueryItem::classify(item.item.as_ref())?;
                }
            }
        }
        rows.sort_by(|a, b| self.compare_keys(&a.key, &b.key).unwrap_or(Ordering::Equal));
        Ok(rows)
    }

    fn compare_keys(&self, a: &RowKey, b: &RowKey) -> QueryResult<Ordering> {
        match (a, b) {
            (RowKey::Raw { epk: ea, id: ia }, RowKey::Raw { epk: eb, id: ib }) => {
                Ok(ea.cmp(eb).then_with(|| ia.cmp(ib)))
            }
            (
                RowKey::OrderBy { items: va, rid: ra },
                RowKey::OrderBy { items: vb, rid: rb },
            ) => {
                let comparator = ItemComparator::new();
                let orders = &self.query_info.order_by;
                Ok(comparator
                    .compare_items(va, vb, orders)?
                    .then_with(|| comparator.compare_rids(ra, rb, orders)))
            }
            _ => Err(QueryError::invariant("mixed row key kinds")),
        }
    }

    fn resume_key(&self, documents: &[Value], token: &str) -> QueryResult<RowKey> {
        documents
            .iter()
            .find(|d| document_id(d) == token)
            .map(|d| self.row_key(d))
            .ok_or_else(|| {
                ServiceError::new(
                    status::BAD_REQUEST,
                    0,
                    format!("continuation {} does not name a document", token),
                )
                .into()
            })
    }

    fn rows_page(
        &self,
        rows: Vec<Row>,
        resume_after: Option<&RowKey>,
        max_item_count: i32,
    ) -> QueryResult<FeedResponse> {
        let page_size = usize::try_from(max_item_count)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SERVED_PAGE_SIZE);

        let mut remaining = Vec::with_capacity(rows.len());
        for row in rows {
            let after = match resume_after {
                Some(key) => self.compare_keys(&row.key, key)? == Ordering::Greater,
                None => true,
            };
            if after {
                remaining.push(row);
            }
        }

        let has_more = remaining.len() > page_size;
        remaining.truncate(page_size);
        let continuation = if has_more {
            remaining.last().map(|row| document_id(&row.document))
        } else {
            None
        };

        let items = remaining
            .into_iter()
            .map(|row| match row.key {
                RowKey::OrderBy { items, rid } => json!({
                    "_rid": rid,
                    "orderByItems": items,
                    "payload": row.document,
                }),
                RowKey::Raw { .. } => row.document,
            })
            .collect();
        Ok(FeedResponse::new(items).with_continuation(continuation))
    }

    fn overlapping(&self, collection_rid: &str, range: &Range) -> QueryResult<Vec<PartitionKeyRange>> {
        if collection_rid != self.resource_id {
            return Err(self.unknown_collection(collection_rid));
        }
        Ok(self
            .state()
            .live
            .iter()
            .filter(|r| r.to_range().overlaps(range))
            .cloned()
            .collect())
    }

    fn unknown_collection(&self, name: &str) -> QueryError {
        ServiceError::new(
            status::NOT_FOUND,
            0,
            format!("collection {} does not exist", name),
        )
        .into()
    }
}

fn document_id(document: &Value) -> String {
    match document.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Resolves `c.a.b` against a document
fn property_path<'a>(document: &'a Value, expression: &str) -> Option<&'a Value> {
    let path = expression
        .split_once('.')
        .map_or(expression, |(_, rest)| rest);
    path.split('.')
        .try_fold(document, |value, segment| value.get(segment))
}

impl QueryExecutor for InMemoryContainer {
    fn execute_query<'a>(&'a self, request: &'a QueryRequest) -> BackendFuture<'a, FeedResponse> {
        Box::pin(async move { self.serve(request) })
    }
}

impl RangeCache for InMemoryContainer {
    fn resolve_overlapping_ranges<'a>(
        &'a self,
        collection_rid: &'a str,
        range: &'a Range,
        _force_refresh: bool,
    ) -> BackendFuture<'a, Vec<PartitionKeyRange>> {
        Box::pin(async move { self.overlapping(collection_rid, range) })
    }
}

impl CollectionCache for InMemoryContainer {
    fn resolve_collection<'a>(
        &'a self,
        resource_link: &'a str,
    ) -> BackendFuture<'a, CollectionMetadata> {
        Box::pin(async move {
            if resource_link != self.resource_link {
                return Err(self.unknown_collection(resource_link));
            }
            Ok(CollectionMetadata {
                resource_id: self.resource_id.clone(),
                partition_key_paths: vec!["/pk".to_string()],
            })
        })
    }
}

impl QueryPlanGateway for InMemoryContainer {
    fn fetch_query_plan<'a>(&'a self, _request: &'a QueryRequest) -> BackendFuture<'a, String> {
        Box::pin(async move { self.query_plan().to_json() })
    }
}
