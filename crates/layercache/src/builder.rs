// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Construction of a [`TieredCache`].

use std::time::Duration;

use anyspawn::Spawner;
use layercache_adapter::StorageAdapter;
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Meter, MeterProvider};
use tick::Clock;

use crate::cache::CacheInner;
use crate::config::{CacheConfig, CacheSettings};
use crate::maintenance;
use crate::selection::AdapterSelection;
use crate::telemetry::CacheTelemetry;
use crate::warmup::WarmupQuery;
use crate::TieredCache;

const DEFAULT_NAME: &str = "layercache";

/// Builder for a [`TieredCache`].
///
/// Created by [`TieredCache::builder`]. Every setting has a default, so
/// `TieredCache::builder(clock).build()` yields a working cache over the in-process
/// adapter.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use layercache::{AdapterSelection, TieredCache};
/// use tick::Clock;
///
/// let cache = TieredCache::builder(Clock::new_frozen())
///     .name("profiles")
///     .adapter(AdapterSelection::memory("profiles"))
///     .default_ttl(Duration::from_secs(300))
///     .max_memory_entries(1_000)
///     .test_mode(true)
///     .build();
///
/// assert_eq!(cache.config().settings.max_memory_entries, 1_000);
/// ```
#[derive(Debug)]
pub struct TieredCacheBuilder {
    clock: Clock,
    name: String,
    settings: CacheSettings,
    adapter: AdapterSelection,
    warmup: Vec<WarmupQuery>,
    spawner: Option<Spawner>,
    logs: bool,
    #[cfg(feature = "metrics")]
    meter: Option<Meter>,
}

impl TieredCacheBuilder {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            clock,
            name: DEFAULT_NAME.to_string(),
            settings: CacheSettings::default(),
            adapter: AdapterSelection::default(),
            warmup: Vec::new(),
            spawner: None,
            logs: true,
            #[cfg(feature = "metrics")]
            meter: None,
        }
    }

    /// Sets the name reported in telemetry.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces every tunable at once, typically with settings loaded from a file.
    #[must_use]
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Selects the storage adapter.
    #[must_use]
    pub fn adapter(mut self, adapter: AdapterSelection) -> Self {
        self.adapter = adapter;
        self
    }

    /// Uses an already constructed storage adapter.
    ///
    /// Shorthand for `adapter(AdapterSelection::custom(adapter))`.
    #[must_use]
    pub fn storage(self, adapter: impl StorageAdapter + 'static) -> Self {
        self.adapter(AdapterSelection::custom(adapter))
    }

    /// Sets the TTL of entries written without one.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.settings.default_ttl = ttl;
        self
    }

    /// Sets the capacity of the local layer.
    #[must_use]
    pub fn max_memory_entries(mut self, entries: usize) -> Self {
        self.settings.max_memory_entries = entries;
        self
    }

    /// Turns default compression on or off.
    #[must_use]
    pub fn compression(mut self, enabled: bool) -> Self {
        self.settings.enable_compression = enabled;
        self
    }

    /// Turns default serialization on or off.
    #[must_use]
    pub fn serialization(mut self, enabled: bool) -> Self {
        self.settings.enable_serialization = enabled;
        self
    }

    /// Sets the patterns applied by
    /// [`invalidate_configured_patterns`](TieredCache::invalidate_configured_patterns).
    #[must_use]
    pub fn invalidation_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.invalidation_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Registers a query for the background warmup.
    #[must_use]
    pub fn warmup_query(mut self, query: WarmupQuery) -> Self {
        self.warmup.push(query);
        self
    }

    /// Sets the period of the background expiry sweep.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.settings.sweep_interval = interval;
        self
    }

    /// Sets the period of the background warmup.
    #[must_use]
    pub fn warmup_interval(mut self, interval: Duration) -> Self {
        self.settings.warmup_interval = interval;
        self
    }

    /// Disables background tasks so tests stay deterministic.
    #[must_use]
    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.settings.test_mode = enabled;
        self
    }

    /// Sets the spawner for background tasks; Tokio is used otherwise.
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Turns `tracing` events on or off. They are on by default.
    #[must_use]
    pub fn logs(mut self, enabled: bool) -> Self {
        self.logs = enabled;
        self
    }

    /// Records OpenTelemetry metrics through `provider`.
    #[cfg(feature = "metrics")]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn metrics(mut self, provider: &dyn MeterProvider) -> Self {
        self.meter = Some(crate::telemetry::metrics::create_meter(provider));
        self
    }

    /// Builds the cache and starts its background tasks.
    ///
    /// # Panics
    ///
    /// Outside test mode, panics if no spawner was set and the call is made outside a
    /// Tokio runtime.
    #[must_use]
    pub fn build(self) -> TieredCache {
        let adapter = self.adapter.resolve(&self.clock, &self.settings);

        #[cfg(feature = "metrics")]
        let telemetry = match &self.meter {
            Some(meter) => CacheTelemetry::with_meter(self.name.clone(), self.logs, meter),
            None => CacheTelemetry::new(self.name.clone(), self.logs),
        };
        #[cfg(not(feature = "metrics"))]
        let telemetry = CacheTelemetry::new(self.name.clone(), self.logs);

        let config = CacheConfig {
            name: self.name,
            adapter: adapter.kind(),
            warmup_keys: self.warmup.iter().map(|query| query.key().to_string()).collect(),
            settings: self.settings,
        };
        let test_mode = config.settings.test_mode;

        let cache = TieredCache::from_inner(CacheInner::new(config, adapter, self.clock, telemetry, self.warmup));
        if !test_mode {
            let spawner = self.spawner.unwrap_or_else(Spawner::new_tokio);
            maintenance::start(&cache, &spawner);
        }
        cache
    }
}
