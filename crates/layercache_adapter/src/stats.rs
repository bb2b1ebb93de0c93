// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Adapter-local hit/miss/error accounting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of an adapter's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct AdapterStats {
    /// Reads that found an unexpired record.
    pub hits: u64,
    /// Reads that found nothing, or only an expired record.
    pub misses: u64,
    /// Records written.
    pub sets: u64,
    /// Records removed through delete, batch delete or tag invalidation.
    pub deletes: u64,
    /// Operations that failed.
    pub errors: u64,
    /// `hits / (hits + misses)`, or `0.0` before the first read.
    pub hit_rate: f64,
}

/// Lock-free counters an adapter bumps as it serves calls.
///
/// ```
/// use layercache_adapter::StatsRecorder;
///
/// let stats = StatsRecorder::new();
/// stats.hit();
/// stats.miss();
/// assert_eq!(stats.snapshot().hit_rate, 0.5);
///
/// stats.reset();
/// assert_eq!(stats.snapshot().hits, 0);
/// ```
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl StatsRecorder {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one hit.
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one miss.
    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts `n` written records.
    pub fn set(&self, n: u64) {
        self.sets.fetch_add(n, Ordering::Relaxed);
    }

    /// Counts `n` removed records.
    pub fn delete(&self, n: u64) {
        self.deletes.fetch_add(n, Ordering::Relaxed);
    }

    /// Counts one failed operation.
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> AdapterStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        AdapterStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate: ratio(hits, hits + misses),
        }
    }

    /// Zeroes all counters.
    pub fn reset(&self) {
        for counter in [&self.hits, &self.misses, &self.sets, &self.deletes, &self.errors] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// `part / whole`, or `0.0` when `whole` is zero.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "rates are approximate by nature")]
pub fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 }
}
