//! Target-range resolution for a query plan

use std::collections::HashSet;

use crate::client::RangeCache;
use crate::error::QueryResult;

use super::range::{PartitionKeyRange, Range};

/// Resolves the partition key ranges a query must fan out to
///
/// Each query range is resolved against the range cache; the union is de-duplicated by
/// range id and returned in ascending `min_inclusive` order. An empty list of query ranges
/// targets the whole key space.
pub async fn resolve_target_ranges(
    range_cache: &dyn RangeCache,
    collection_rid: &str,
    query_ranges: &[Range],
    force_refresh: bool,
) -> QueryResult<Vec<PartitionKeyRange>> {
    let full = [Range::full()];
    let query_ranges = if query_ranges.is_empty() {
        &full[..]
    } else {
        query_ranges
    };

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for query_range in query_ranges {
        let overlapping = range_cache
            .resolve_overlapping_ranges(collection_rid, query_range, force_refresh)
            .await?;
        for range in overlapping {
            if seen.insert(range.id.clone()) {
                targets.push(range);
            }
        }
    }

    sort_by_min(&mut targets);
    Ok(targets)
}

/// Orders ranges by their lower bound
pub fn sort_by_min(ranges: &mut [PartitionKeyRange]) {
    ranges.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));
}
