//! Locating the resume partition for an inbound continuation

use crate::continuation::CompositeContinuationToken;
use crate::error::{QueryError, QueryResult};
use crate::routing::{PartitionKeyRange, Range};

use super::producer::ProducerSeed;

/// Target ranges partitioned around the resume point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRanges {
    /// Ranges before the resume point
    pub left: Vec<PartitionKeyRange>,
    pub target: PartitionKeyRange,
    /// Ranges after the resume point
    pub right: Vec<PartitionKeyRange>,
}

/// Finds the range whose lower bound equals `resume.min`
///
/// `ranges` must be sorted by `min_inclusive`. Only the lower bound is matched; if the
/// ranges were re-fetched and no range starts there, the query cannot resume safely.
pub fn find_target_range(ranges: &[PartitionKeyRange], resume: &Range) -> QueryResult<TargetRanges> {
    let index = ranges
        .iter()
        .position(|r| r.min_inclusive == resume.min)
        .ok_or_else(|| QueryError::NoMatchingRange {
            min: resume.min.clone(),
        })?;

    Ok(TargetRanges {
        left: ranges[..index].to_vec(),
        target: ranges[index].clone(),
        right: ranges[index + 1..].to_vec(),
    })
}

/// Producer seeds for a parallel query resuming from `token`
///
/// Ranges before the target are exhausted and dropped. The target resumes from the
/// embedded backend token; later ranges start fresh.
pub fn find_target_range_and_extract_continuation_tokens(
    ranges: &[PartitionKeyRange],
    token: &CompositeContinuationToken,
) -> QueryResult<Vec<ProducerSeed>> {
    let TargetRanges { target, right, .. } = find_target_range(ranges, &token.range)?;

    let mut seeds = Vec::with_capacity(right.len() + 1);
    seeds.push(ProducerSeed::new(target, token.token.clone()));
    seeds.extend(right.into_iter().map(|range| ProducerSeed::new(range, None)));
    Ok(seeds)
}
