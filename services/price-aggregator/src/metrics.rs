//! Pipeline counters
//!
//! Shared as `Arc<PipelineMetrics>` across the tasks of one run and
//! exported as a sorted map once the run finishes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::CacheStats;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub lines_delivered: AtomicU64,
    pub parse_failures: AtomicU64,
    pub records_enriched: AtomicU64,
    pub lookup_failures: AtomicU64,
    pub records_written: AtomicU64,
    pub snapshots_emitted: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lines_delivered(&self, lines: u64) {
        self.lines_delivered.store(lines, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enriched(&self) {
        self.records_enriched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_failure(&self) {
        self.lookup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_records_written(&self, records: u64) {
        self.records_written.store(records, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self) {
        self.snapshots_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Export counters with the multiplier cache figures merged in.
    ///
    /// Every cache miss is one store query.
    pub fn export(&self, cache: CacheStats) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("lines_delivered".to_string(), self.lines_delivered.load(Ordering::Relaxed));
        m.insert("parse_failures".to_string(), self.parse_failures.load(Ordering::Relaxed));
        m.insert("records_enriched".to_string(), self.records_enriched.load(Ordering::Relaxed));
        m.insert("lookup_failures".to_string(), self.lookup_failures.load(Ordering::Relaxed));
        m.insert("records_written".to_string(), self.records_written.load(Ordering::Relaxed));
        m.insert("snapshots_emitted".to_string(), self.snapshots_emitted.load(Ordering::Relaxed));
        m.insert("cache_hits".to_string(), cache.hits);
        m.insert("cache_misses".to_string(), cache.misses);
        m
    }
}
