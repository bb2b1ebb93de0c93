// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A two-layer cache: a bounded in-process layer in front of a pluggable storage adapter.
//!
//! [`TieredCache`] consults its local layer first, then the storage adapter, then an
//! optional producer, and populates both layers on the way back. It provides:
//!
//! - Per-call TTL, tags and namespaces through [`CacheOptions`]
//! - Least-recently-accessed eviction in the local layer
//! - Invalidation by tag across both layers, and by pattern
//! - Warmup queries and a periodic expiry sweep running in the background
//! - Memoization with [`TieredCache::wrap`] and cache-aside handles
//! - Structured `tracing` events and, with the `metrics` feature, OpenTelemetry metrics
//!
//! Storage adapter failures never fail a read or write: they turn into misses and are
//! logged. The adapter is chosen once, at construction, through [`AdapterSelection`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use layercache::{CacheOptions, TieredCache};
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let cache = TieredCache::builder(Clock::new_frozen())
//!     .default_ttl(Duration::from_secs(300))
//!     .test_mode(true)
//!     .build();
//!
//! let price = cache
//!     .get_or_insert_with(
//!         "price:widget",
//!         || async { Ok::<_, std::io::Error>(Some(9.99)) },
//!         &CacheOptions::new().tag("prices"),
//!     )
//!     .await?;
//! assert_eq!(price, Some(9.99));
//!
//! assert_eq!(cache.invalidate_by_tag("prices").await, 2);
//! assert_eq!(cache.get::<f64>("price:widget").await?, None);
//! # Ok::<(), layercache::Error>(())
//! # }).unwrap();
//! ```
//!
//! # Background Tasks
//!
//! Unless built in test mode, a cache spawns an expiry sweep (every 60 seconds by
//! default) and, when warmup queries are registered, a periodic warmup (every 5
//! minutes). Both stop on [`TieredCache::close`] or when the last clone is dropped.
//! Tasks are spawned on Tokio unless another [`anyspawn::Spawner`] is supplied.

mod aside;
mod builder;
mod cache;
pub mod config;
mod error;
mod local;
mod maintenance;
mod selection;
mod stats;
mod tags;
mod telemetry;
mod warmup;
mod wrap;

#[doc(inline)]
pub use aside::CacheAside;
#[doc(inline)]
pub use builder::TieredCacheBuilder;
#[doc(inline)]
pub use cache::TieredCache;
#[doc(inline)]
pub use config::{CacheConfig, CacheSettings};
#[doc(inline)]
pub use error::{BoxError, Error, ErrorKind, MAX_KEY_LENGTH, Result};
#[doc(inline)]
pub use layercache_adapter::{
    AdapterEntry, AdapterKind, AdapterStats, BatchEntry, BatchGet, CacheOptions, DynamicAdapter, StorageAdapter,
};
#[doc(inline)]
pub use selection::AdapterSelection;
#[doc(inline)]
pub use stats::{AdapterReport, CacheStats, CombinedStats, LocalStats};
#[doc(inline)]
pub use warmup::{WarmupQuery, WarmupSummary};
#[doc(inline)]
pub use wrap::{Memoized, WrapOptions};
