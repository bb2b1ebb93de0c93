// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Statistics snapshots.

use std::sync::atomic::Ordering;
use std::time::Duration;

use layercache_adapter::{AdapterStats, StorageAdapter, ratio};
use serde::Serialize;

use crate::TieredCache;

/// Counters of the local layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LocalStats {
    /// Entries currently held, expired ones included until swept.
    pub entries: usize,
    /// Lookups answered by the local layer.
    pub hits: u64,
    /// Lookups that reached the local layer.
    pub requests: u64,
    /// `hits / requests`.
    pub hit_rate: f64,
}

/// State of the storage adapter.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[non_exhaustive]
pub struct AdapterReport {
    /// Result of a health probe.
    pub healthy: bool,
    /// Round trip of the health probe.
    pub latency: Option<Duration>,
    /// The adapter's own counters.
    pub adapter: AdapterStats,
    /// Adapter failures the orchestrator absorbed.
    pub errors: u64,
}

/// Figures across both layers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[non_exhaustive]
pub struct CombinedStats {
    /// Local entries plus the records the adapter reports holding.
    pub total_entries: u64,
    /// Share of lookups answered by either layer.
    pub hit_rate: f64,
    /// Rough size of the local layer's values.
    pub estimated_memory_bytes: usize,
}

/// A snapshot returned by [`TieredCache::stats`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[non_exhaustive]
pub struct CacheStats {
    /// The local layer.
    pub l1: LocalStats,
    /// The storage adapter.
    pub l2: AdapterReport,
    /// Both layers together.
    pub combined: CombinedStats,
}

impl TieredCache {
    /// Takes a statistics snapshot. Probes the adapter's health.
    ///
    /// # Examples
    ///
    /// ```
    /// use layercache::{CacheOptions, TieredCache};
    /// use tick::Clock;
    ///
    /// # futures::executor::block_on(async {
    /// let cache = TieredCache::builder(Clock::new_frozen()).test_mode(true).build();
    /// cache.set("k", &1, &CacheOptions::new()).await?;
    /// cache.get::<i32>("k").await?;
    ///
    /// let stats = cache.stats().await;
    /// assert_eq!(stats.l1.entries, 1);
    /// assert_eq!(stats.l1.hit_rate, 1.0);
    /// assert!(stats.l2.healthy);
    /// # Ok::<(), layercache::Error>(())
    /// # }).unwrap();
    /// ```
    pub async fn stats(&self) -> CacheStats {
        let (entries, hits, requests, estimated_memory_bytes) = {
            let local = self.inner.local.lock();
            (local.len(), local.hits(), local.requests(), local.estimated_bytes())
        };
        let health = self.inner.adapter.health_check().await;
        let adapter = self.inner.adapter.stats();

        CacheStats {
            l1: LocalStats {
                entries,
                hits,
                requests,
                hit_rate: ratio(hits, requests),
            },
            l2: AdapterReport {
                healthy: health.healthy,
                latency: health.latency,
                adapter,
                errors: self.inner.errors.load(Ordering::Relaxed),
            },
            combined: CombinedStats {
                total_entries: entries as u64 + self.inner.adapter.len().unwrap_or(0),
                hit_rate: ratio(hits + adapter.hits, requests).min(1.0),
                estimated_memory_bytes,
            },
        }
    }
}
