//! Access and growth counters.
//!
//! Counters are instrumentation only: no index decision reads them. They use
//! relaxed atomics so that `get(&self)` can record bucket/node visits.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of index statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Buckets (hash) or nodes (tree) visited by lookups and inserts.
    pub accesses: u64,
    /// Number of lookups performed.
    pub lookups: u64,
    /// Bucket splits (hash) or leaf splits (tree).
    pub splits: u64,
    /// Internal node splits (tree only).
    pub internal_splits: u64,
    /// Extendible directory doublings, linear rounds completed, or tree root splits.
    pub growths: u64,
}

impl StatsSnapshot {
    /// Average number of buckets/nodes visited per lookup.
    pub fn accesses_per_lookup(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.accesses as f64 / self.lookups as f64
        }
    }
}

/// Thread-safe counters embedded in every index.
#[derive(Default, Debug)]
pub struct AccessStats {
    accesses: AtomicU64,
    lookups: AtomicU64,
    splits: AtomicU64,
    internal_splits: AtomicU64,
    growths: AtomicU64,
}

impl AccessStats {
    #[inline]
    pub(crate) fn record_access(&self, n: u64) {
        self.accesses.fetch_add(n, AtomicOrdering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_lookup(&self) {
        self.lookups.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn record_split(&self) {
        self.splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn record_internal_split(&self) {
        self.internal_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn record_growth(&self) {
        self.growths.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Returns a consistent-enough copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accesses: self.accesses.load(AtomicOrdering::Relaxed),
            lookups: self.lookups.load(AtomicOrdering::Relaxed),
            splits: self.splits.load(AtomicOrdering::Relaxed),
            internal_splits: self.internal_splits.load(AtomicOrdering::Relaxed),
            growths: self.growths.load(AtomicOrdering::Relaxed),
        }
    }

    /// Zeroes the access and lookup counters. Growth counters are kept.
    pub fn reset_accesses(&self) {
        self.accesses.store(0, AtomicOrdering::Relaxed);
        self.lookups.store(0, AtomicOrdering::Relaxed);
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self, index: &'static str) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "dynindex::stats",
            index,
            accesses = snapshot.accesses,
            lookups = snapshot.lookups,
            splits = snapshot.splits,
            internal_splits = snapshot.internal_splits,
            growths = snapshot.growths,
            "index stats snapshot"
        );
    }
}

impl Clone for AccessStats {
    fn clone(&self) -> Self {
        let s = self.snapshot();
        Self {
            accesses: AtomicU64::new(s.accesses),
            lookups: AtomicU64::new(s.lookups),
            splits: AtomicU64::new(s.splits),
            internal_splits: AtomicU64::new(s.internal_splits),
            growths: AtomicU64::new(s.growths),
        }
    }
}
