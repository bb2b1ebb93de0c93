// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory storage adapter using moka.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::lock::Mutex;
use layercache_adapter::keys::{glob_to_regex, namespaced_key, strip_namespace};
use layercache_adapter::{
    AdapterEntry, AdapterKind, AdapterStats, BatchEntry, BatchGet, CacheOptions, Codec, Error, HealthStatus, Result, StatsRecorder,
    StorageAdapter, StoredRecord,
};
use moka::future::Cache;
use serde_json::Value;
use tick::Clock;

use crate::builder::MemoryAdapterBuilder;

/// A storage adapter that keeps encoded records in process memory.
///
/// Records carry an absolute expiry checked against the injected [`Clock`]; an
/// expired record is treated as absent and removed when touched. Capacity-based
/// eviction is delegated to moka.
///
/// Clones share the same store.
///
/// # Examples
///
/// ```
/// use layercache_adapter::{CacheOptions, StorageAdapter};
/// use layercache_memory::MemoryAdapter;
/// use serde_json::json;
/// use tick::ClockControl;
///
/// # futures::executor::block_on(async {
/// let adapter = MemoryAdapter::new(&ClockControl::new().to_clock());
///
/// assert_eq!(adapter.increment("visits", 1).await?, 1);
/// assert_eq!(adapter.increment("visits", 2).await?, 3);
/// assert_eq!(adapter.get("visits", &CacheOptions::new()).await?, Some(json!(3)));
/// # Ok::<(), layercache_adapter::Error>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    inner: Cache<String, StoredRecord>,
    clock: Clock,
    namespace: Arc<str>,
    default_ttl: Duration,
    codec: Codec,
    stats: Arc<StatsRecorder>,
    // Serializes read-modify-write counter updates.
    counters: Arc<Mutex<()>>,
    closed: Arc<AtomicBool>,
}

impl MemoryAdapter {
    /// Creates an unbounded adapter with default settings.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self::builder(clock).build()
    }

    /// Creates an adapter holding at most `max_capacity` records.
    #[must_use]
    pub fn with_capacity(clock: &Clock, max_capacity: u64) -> Self {
        Self::builder(clock).max_capacity(max_capacity).build()
    }

    /// Creates a new builder for configuring an in-memory adapter.
    #[must_use]
    pub fn builder(clock: &Clock) -> MemoryAdapterBuilder {
        MemoryAdapterBuilder::new(clock)
    }

    pub(crate) fn from_builder(builder: MemoryAdapterBuilder) -> Self {
        let mut moka_builder = Cache::builder();

        if let Some(capacity) = builder.max_capacity {
            moka_builder = moka_builder.max_capacity(capacity);
        }

        if let Some(capacity) = builder.initial_capacity {
            moka_builder = moka_builder.initial_capacity(capacity);
        }

        if let Some(name) = builder.name.as_deref() {
            moka_builder = moka_builder.name(name);
        }

        let codec = builder.codec();
        Self {
            inner: moka_builder.build(),
            clock: builder.clock,
            namespace: Arc::from(builder.namespace),
            default_ttl: builder.default_ttl,
            codec,
            stats: Arc::new(StatsRecorder::new()),
            counters: Arc::new(Mutex::new(())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the namespace prefixed to every stored key.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Removes every expired record in the adapter's namespace and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.system_time();
        let expired: Vec<String> = self
            .own_records()
            .filter(|(_, record)| record.is_expired(now))
            .map(|(stored, _)| stored)
            .collect();
        for stored in &expired {
            self.inner.invalidate(stored).await;
        }
        expired.len()
    }

    fn stored_key(&self, key: &str, options: &CacheOptions) -> String {
        namespaced_key(options.namespace.as_deref().unwrap_or(&self.namespace), key)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            self.stats.error();
            return Err(Error::from_message("memory adapter is closed"));
        }
        Ok(())
    }

    /// Returns every record under the adapter's own namespace, keyed by stored key.
    fn own_records(&self) -> impl Iterator<Item = (String, StoredRecord)> + '_ {
        self.inner
            .iter()
            .filter(|(stored, _)| strip_namespace(&self.namespace, stored).is_some())
            .map(|(stored, record)| (stored.as_ref().clone(), record))
    }

    /// Looks up an unexpired record, removing it if it has expired.
    async fn live_record(&self, stored: &str) -> Option<StoredRecord> {
        let record = self.inner.get(stored).await?;
        if record.is_expired(self.clock.system_time()) {
            self.inner.invalidate(stored).await;
            return None;
        }
        Some(record)
    }

    async fn write(&self, stored: String, value: &Value, ttl: Duration, tags: Vec<String>, codec: Codec) -> Result<()> {
        let payload = codec.encode(value).inspect_err(|_| self.stats.error())?;
        let now = self.clock.system_time();
        let key = strip_namespace(&self.namespace, &stored).unwrap_or(&stored).to_owned();
        let mut record = StoredRecord::new(key, payload, tags, now, ttl);
        if let Some(previous) = self.live_record(&stored).await {
            record = record.replacing(&previous);
        }
        self.inner.insert(stored, record).await;
        self.stats.set(1);
        Ok(())
    }

    fn decode(&self, record: &StoredRecord) -> Result<Value> {
        self.codec.decode(&record.payload).inspect_err(|_| self.stats.error())
    }

    async fn remove(&self, stored: &str) -> bool {
        match self.inner.remove(stored).await {
            Some(record) if !record.is_expired(self.clock.system_time()) => {
                self.stats.delete(1);
                true
            }
            _ => false,
        }
    }
}

impl StorageAdapter for MemoryAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Memory
    }

    async fn get(&self, key: &str, options: &CacheOptions) -> Result<Option<Value>> {
        Ok(self.get_entry(key, options).await?.map(|entry| entry.value))
    }

    async fn get_entry(&self, key: &str, options: &CacheOptions) -> Result<Option<AdapterEntry>> {
        self.ensure_open()?;
        let stored = self.stored_key(key, options);
        let Some(record) = self.live_record(&stored).await else {
            self.stats.miss();
            return Ok(None);
        };
        let value = self.decode(&record)?;
        self.stats.hit();
        Ok(Some(AdapterEntry::new(value, record.tags)))
    }

    async fn set(&self, key: &str, value: &Value, options: &CacheOptions) -> Result<bool> {
        self.ensure_open()?;
        let stored = self.stored_key(key, options);
        let ttl = options.ttl_or(self.default_ttl);
        self.write(stored, value, ttl, options.tags.clone(), self.codec.for_call(options))
            .await?;
        Ok(true)
    }

    async fn delete(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.remove(&self.stored_key(key, options)).await)
    }

    async fn exists(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.live_record(&self.stored_key(key, options)).await.is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.ensure_open()?;
        let stored = namespaced_key(&self.namespace, key);
        let Some(mut record) = self.live_record(&stored).await else {
            return Ok(false);
        };
        record.refresh_expiry(self.clock.system_time(), ttl);
        self.inner.insert(stored, record).await;
        Ok(true)
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        self.ensure_open()?;
        let _guard = self.counters.lock().await;
        let stored = namespaced_key(&self.namespace, key);

        let (current, ttl, tags) = match self.live_record(&stored).await {
            Some(record) => {
                let current = self
                    .decode(&record)?
                    .as_i64()
                    .ok_or_else(|| Error::from_message(format!("value at '{key}' is not an integer")))?;
                let remaining = record
                    .expires_at
                    .duration_since(self.clock.system_time())
                    .ok()
                    .filter(|remaining| !remaining.is_zero())
                    .unwrap_or(self.default_ttl);
                (current, remaining, record.tags)
            }
            None => (0, self.default_ttl, Vec::new()),
        };

        let next = current.saturating_add(by);
        self.write(stored, &Value::from(next), ttl, tags, self.codec).await?;
        Ok(next)
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.increment(key, by.saturating_neg()).await
    }

    async fn mget(&self, keys: &[String]) -> Result<BatchGet<AdapterEntry>> {
        self.ensure_open()?;
        let mut batch = BatchGet::default();
        for key in keys {
            // An undecodable record reads as missing; `get_entry` has already counted the error.
            match self.get_entry(key, &CacheOptions::new()).await {
                Ok(Some(entry)) => {
                    batch.found.insert(key.clone(), entry);
                }
                Ok(None) | Err(_) => batch.missing.push(key.clone()),
            }
        }
        Ok(batch)
    }

    async fn mset(&self, entries: &[BatchEntry]) -> Result<usize> {
        self.ensure_open()?;
        for entry in entries {
            let stored = namespaced_key(&self.namespace, &entry.key);
            let ttl = entry.ttl.unwrap_or(self.default_ttl);
            self.write(stored, &entry.value, ttl, entry.tags.clone(), self.codec).await?;
        }
        Ok(entries.len())
    }

    async fn mdel(&self, keys: &[String]) -> Result<usize> {
        self.ensure_open()?;
        let mut removed = 0;
        for key in keys {
            if self.remove(&namespaced_key(&self.namespace, key)).await {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let matcher = glob_to_regex(pattern)?;
        let now = self.clock.system_time();
        let mut keys: Vec<String> = self
            .own_records()
            .filter(|(_, record)| !record.is_expired(now) && matcher.is_match(&record.key))
            .map(|(_, record)| record.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<usize> {
        self.ensure_open()?;
        // Per-call namespaces share the store, so tags reach across all of them.
        let tagged: Vec<String> = self
            .inner
            .iter()
            .filter(|(_, record)| record.has_any_tag(tags))
            .map(|(stored, _)| stored.as_ref().clone())
            .collect();
        for stored in &tagged {
            self.inner.invalidate(stored).await;
        }
        self.stats.delete(tagged.len() as u64);
        Ok(tagged.len())
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        let stored: Vec<String> = self.own_records().map(|(stored, _)| stored).collect();
        for key in &stored {
            self.inner.invalidate(key).await;
        }
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.closed.load(Ordering::Acquire) {
            return HealthStatus::unhealthy("memory adapter is closed");
        }
        let stopwatch = self.clock.stopwatch();
        self.inner.run_pending_tasks().await;
        HealthStatus::healthy(stopwatch.elapsed())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.inner.invalidate_all();
        }
    }

    fn stats(&self) -> AdapterStats {
        self.stats.snapshot()
    }

    fn reset_stats(&self) {
        self.stats.reset();
    }

    fn len(&self) -> Option<u64> {
        Some(self.inner.entry_count())
    }
}
