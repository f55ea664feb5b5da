//! Partition key ranges and effective-partition-key ranges

use serde::{Deserialize, Serialize};

/// Lowest effective partition key
pub const MINIMUM_INCLUSIVE_EFFECTIVE_PARTITION_KEY: &str = "";
/// Upper bound of the effective partition key space
pub const MAXIMUM_EXCLUSIVE_EFFECTIVE_PARTITION_KEY: &str = "FF";

/// A contiguous key-space slice owned by one physical partition
///
/// Always `[min_inclusive, max_exclusive)`. Snapshots are read-only; a split replaces
/// a range with children whose `parents` name it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyRange {
    pub id: String,
    pub min_inclusive: String,
    pub max_exclusive: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    pub fn new(
        id: impl Into<String>,
        min_inclusive: impl Into<String>,
        max_exclusive: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            min_inclusive: min_inclusive.into(),
            max_exclusive: max_exclusive.into(),
            parents: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }

    /// The range covering the whole key space
    pub fn full(id: impl Into<String>) -> Self {
        Self::new(
            id,
            MINIMUM_INCLUSIVE_EFFECTIVE_PARTITION_KEY,
            MAXIMUM_EXCLUSIVE_EFFECTIVE_PARTITION_KEY,
        )
    }

    pub fn to_range(&self) -> Range {
        Range::new(
            self.min_inclusive.clone(),
            self.max_exclusive.clone(),
            true,
            false,
        )
    }

    pub fn contains(&self, key: &str) -> bool {
        self.min_inclusive.as_str() <= key && key < self.max_exclusive.as_str()
    }
}

/// A range of effective partition keys with explicit bound inclusivity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub min: String,
    pub max: String,
    #[serde(default = "default_min_inclusive")]
    pub is_min_inclusive: bool,
    #[serde(default)]
    pub is_max_inclusive: bool,
}

fn default_min_inclusive() -> bool {
    true
}

impl Range {
    pub fn new(
        min: impl Into<String>,
        max: impl Into<String>,
        is_min_inclusive: bool,
        is_max_inclusive: bool,
    ) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
            is_min_inclusive,
            is_max_inclusive,
        }
    }

    /// The whole effective partition key space
    pub fn full() -> Self {
        Self::new(
            MINIMUM_INCLUSIVE_EFFECTIVE_PARTITION_KEY,
            MAXIMUM_EXCLUSIVE_EFFECTIVE_PARTITION_KEY,
            true,
            false,
        )
    }

    pub fn contains(&self, key: &str) -> bool {
        let above_min = if self.is_min_inclusive {
            self.min.as_str() <= key
        } else {
            self.min.as_str() < key
        };
        let below_max = if self.is_max_inclusive {
            key <= self.max.as_str()
        } else {
            key < self.max.as_str()
        };
        above_min && below_max
    }

    /// Whether the two ranges share at least one key
    pub fn overlaps(&self, other: &Range) -> bool {
        // self ends before other starts
        if self.max < other.min
            || (self.max == other.min && !(self.is_max_inclusive && other.is_min_inclusive))
        {
            return false;
        }
        // other ends before self starts
        if other.max < self.min
            || (other.max == self.min && !(other.is_max_inclusive && self.is_min_inclusive))
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_range_is_half_open() {
        let range = PartitionKeyRange::new("0", "A", "M");
        assert!(range.contains("A"));
        assert!(range.contains("L"));
        assert!(!range.contains("M"));
        assert_eq!(range.to_range(), Range::new("A", "M", true, false));
    }

    #[test]
    fn test_adjacent_ranges_do_not_overlap() {
        let left = Range::new("A", "F", true, false);
        let right = Range::new("F", "M", true, false);
        assert!(!left.overlaps(&right));
        assert!(!right.overlaps(&left));
    }

    #[test]
    fn test_overlapping_ranges() {
        let wide = Range::new("A", "M", true, false);
        let inner = Range::new("C", "D", true, true);
        assert!(wide.overlaps(&inner));
        assert!(inner.overlaps(&wide));

        let point = Range::new("F", "F", true, true);
        assert!(Range::new("F", "M", true, false).overlaps(&point));
        assert!(!Range::new("A", "F", true, false).overlaps(&point));
    }

    #[test]
    fn test_range_json_shape() {
        let range: Range = serde_json::from_str(r#"{"min":"","max":"FF"}"#).unwrap();
        assert_eq!(range, Range::full());
        let json = serde_json::to_value(&range).unwrap();
        assert_eq!(json["isMinInclusive"], true);
        assert_eq!(json["isMaxInclusive"], false);
    }
}
