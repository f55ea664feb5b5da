//! Pipeline counters
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every component of the pipelines built from one client
///
/// Uses Relaxed ordering; counters are observational and never drive control flow.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Backend pages received by producers
    pages_fetched: AtomicU64,
    /// Empty pages folded into a later page
    empty_pages_filtered: AtomicU64,
    /// Partition splits absorbed by producers
    splits_absorbed: AtomicU64,
    /// Items handed to the caller
    items_emitted: AtomicU64,
    /// 400/1004 responses that triggered pipeline construction
    cross_partition_fallbacks: AtomicU64,
    /// Query plans fetched from the gateway
    query_plans_retrieved: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_pages_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_empty_pages_filtered(&self) {
        self.empty_pages_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_splits_absorbed(&self) {
        self.splits_absorbed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_items_emitted(&self, count: u64) {
        self.items_emitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_cross_partition_fallbacks(&self) {
        self.cross_partition_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_query_plans_retrieved(&self) {
        self.query_plans_retrieved.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            empty_pages_filtered: self.empty_pages_filtered.load(Ordering::Relaxed),
            splits_absorbed: self.splits_absorbed.load(Ordering::Relaxed),
            items_emitted: self.items_emitted.load(Ordering::Relaxed),
            cross_partition_fallbacks: self.cross_partition_fallbacks.load(Ordering::Relaxed),
            query_plans_retrieved: self.query_plans_retrieved.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`PipelineMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    pub pages_fetched: u64,
    pub empty_pages_filtered: u64,
    pub splits_absorbed: u64,
    pub items_emitted: u64,
    pub cross_partition_fallbacks: u64,
    pub query_plans_retrieved: u64,
}
