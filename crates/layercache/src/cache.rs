// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The orchestrator: a bounded local layer in front of one storage adapter.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::channel::oneshot;
use layercache_adapter::{AdapterEntry, AdapterKind, BatchEntry, BatchGet, CacheOptions, DynamicAdapter, StorageAdapter};
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tick::Clock;

use crate::builder::TieredCacheBuilder;
use crate::config::{CacheConfig, SLOW_CALL_THRESHOLD};
use crate::error::{BoxError, validate_key};
use crate::local::{EntryKey, LocalLayer, LocalRead};
use crate::telemetry::{CacheActivity, CacheOperation, CacheTelemetry, Event};
use crate::warmup::WarmupQuery;
use crate::{Error, ErrorKind, Result};

#[derive(Debug)]
pub(crate) struct CacheInner {
    pub(crate) config: CacheConfig,
    pub(crate) adapter: DynamicAdapter,
    pub(crate) local: Mutex<LocalLayer>,
    pub(crate) clock: Clock,
    pub(crate) telemetry: CacheTelemetry,
    pub(crate) warmup: Vec<WarmupQuery>,
    /// Adapter failures absorbed by this orchestrator.
    pub(crate) errors: AtomicU64,
    pub(crate) closed: AtomicBool,
    /// Dropping a sender stops the matching background task.
    pub(crate) background: Mutex<Vec<oneshot::Sender<()>>>,
}

impl CacheInner {
    pub(crate) fn new(
        config: CacheConfig,
        adapter: DynamicAdapter,
        clock: Clock,
        telemetry: CacheTelemetry,
        warmup: Vec<WarmupQuery>,
    ) -> Self {
        Self {
            local: Mutex::new(LocalLayer::new(config.settings.max_memory_entries)),
            config,
            adapter,
            clock,
            telemetry,
            warmup,
            errors: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
        }
    }
}

/// A two-layer cache: a bounded in-process layer over a storage adapter.
///
/// Reads consult the local layer, then the adapter, then an optional producer,
/// populating both layers on the way back. Writes go to the adapter first, then to
/// the local layer. The cache is a best-effort accelerator: adapter failures become
/// misses, `false` or zero and are logged, never returned. Only invalid input,
/// producer failures and [`clear`](Self::clear) produce an [`Error`].
///
/// Values cross the API as any `serde` type and are held as JSON values inside.
///
/// `TieredCache` is cheap to clone; clones share both layers.
///
/// # Concurrent misses
///
/// No request coalescing is done. Two concurrent reads of the same absent key both
/// run their producer and both write the result; the last write wins.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use layercache::{CacheOptions, TieredCache};
/// use serde::{Deserialize, Serialize};
/// use tick::Clock;
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct User {
///     name: String,
/// }
///
/// # futures::executor::block_on(async {
/// let cache = TieredCache::builder(Clock::new_frozen()).test_mode(true).build();
/// let options = CacheOptions::new().ttl(Duration::from_secs(60)).tag("users");
///
/// cache.set("user:1", &User { name: "Ada".into() }, &options).await?;
/// assert_eq!(cache.get::<User>("user:1").await?, Some(User { name: "Ada".into() }));
///
/// cache.invalidate_by_tag("users").await;
/// assert_eq!(cache.get::<User>("user:1").await?, None);
/// # Ok::<(), layercache::Error>(())
/// # }).unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct TieredCache {
    pub(crate) inner: Arc<CacheInner>,
}

impl TieredCache {
    /// Starts building a cache whose expiry and timers follow `clock`.
    #[must_use]
    pub fn builder(clock: Clock) -> TieredCacheBuilder {
        TieredCacheBuilder::new(clock)
    }

    pub(crate) fn from_inner(inner: CacheInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    /// Returns the configuration this cache was built with.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the name reported in telemetry.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.telemetry.name()
    }

    /// Returns what kind of storage adapter backs this cache.
    #[must_use]
    pub fn adapter_kind(&self) -> AdapterKind {
        self.inner.adapter.kind()
    }

    /// Returns the storage adapter, for operations the orchestrator does not wrap.
    #[must_use]
    pub fn adapter(&self) -> &DynamicAdapter {
        &self.inner.adapter
    }

    /// Returns the cached value of `key`, or `None`.
    ///
    /// A value that does not deserialize into `T` reads as a miss.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidKey`] for a malformed key.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_with_options(key, &CacheOptions::new()).await
    }

    /// Like [`get`](Self::get); `options` supply the namespace and the TTL used when
    /// an adapter hit is promoted into the local layer. The promoted entry keeps the
    /// tags it was stored under, plus any in `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidKey`] for a malformed key.
    pub async fn get_with_options<T: DeserializeOwned>(&self, key: &str, options: &CacheOptions) -> Result<Option<T>> {
        let watch = self.inner.clock.stopwatch();
        let found = self.lookup(key, options).await?;
        let value = found.and_then(|value| self.decode(key, &value));
        self.finish(CacheOperation::Get, key, watch.elapsed());
        Ok(value)
    }

    /// Returns the cached value of `key`, computing and storing it on a miss.
    ///
    /// `producer` runs at most once, and only when neither layer has the key. A
    /// produced `Some` is written through [`set`](Self::set) before it is returned;
    /// `None` is returned as is and nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Producer`] with the producer's error as source when the
    /// producer fails, [`ErrorKind::InvalidKey`] for a malformed key and
    /// [`ErrorKind::InvalidValue`] when the produced value cannot be serialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use layercache::{CacheOptions, TieredCache};
    /// use tick::Clock;
    ///
    /// # futures::executor::block_on(async {
    /// let cache = TieredCache::builder(Clock::new_frozen()).test_mode(true).build();
    ///
    /// let answer = cache
    ///     .get_or_insert_with("answer", || async { Ok::<_, std::io::Error>(Some(42)) }, &CacheOptions::new())
    ///     .await?;
    /// assert_eq!(answer, Some(42));
    /// assert_eq!(cache.get::<i32>("answer").await?, Some(42));
    /// # Ok::<(), layercache::Error>(())
    /// # }).unwrap();
    /// ```
    pub async fn get_or_insert_with<T, F, Fut, E>(&self, key: &str, producer: F, options: &CacheOptions) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        let watch = self.inner.clock.stopwatch();
        if let Some(found) = self.lookup(key, options).await? {
            if let Some(value) = self.decode(key, &found) {
                self.finish(CacheOperation::Get, key, watch.elapsed());
                return Ok(Some(value));
            }
        }

        self.record(Event::new(CacheOperation::Get, CacheActivity::Fallback).key(key));
        let produced = producer()
            .await
            .map_err(|error| Error::caused_by(ErrorKind::Producer, error))?;

        if let Some(value) = &produced {
            self.set(key, value, options).await?;
            self.record(Event::new(CacheOperation::Get, CacheActivity::FallbackPromotion).key(key));
        }
        self.finish(CacheOperation::Get, key, watch.elapsed());
        Ok(produced)
    }

    /// Writes `value` to the storage adapter, then to the local layer.
    ///
    /// Returns the adapter's success flag. An adapter failure returns `false` and
    /// leaves the local layer untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidKey`] for a malformed key and
    /// [`ErrorKind::InvalidValue`] when `value` cannot be serialized.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: &CacheOptions) -> Result<bool> {
        validate_key(key)?;
        let value = serde_json::to_value(value).map_err(|error| Error::caused_by(ErrorKind::InvalidValue, error))?;
        self.set_value(key, value, options).await
    }

    pub(crate) async fn set_value(&self, key: &str, value: Value, options: &CacheOptions) -> Result<bool> {
        validate_key(key)?;
        match self.inner.adapter.set(key, &value, &self.adapter_options(options)).await {
            Ok(stored) => {
                self.store_local(EntryKey::new(key, options), Arc::new(value), options);
                self.record(Event::new(CacheOperation::Set, CacheActivity::Inserted).key(key));
                Ok(stored)
            }
            Err(error) => {
                self.absorb(CacheOperation::Set, Some(key), &error);
                Ok(false)
            }
        }
    }

    /// Removes `key` from both layers.
    ///
    /// Returns whether the storage adapter held the key, so a second delete of the
    /// same key returns `false`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidKey`] for a malformed key.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.delete_with_options(key, &CacheOptions::new()).await
    }

    /// Like [`delete`](Self::delete), for a key written under `options.namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidKey`] for a malformed key.
    pub async fn delete_with_options(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        validate_key(key)?;
        Ok(self.remove_everywhere(&EntryKey::new(key, options)).await)
    }

    /// Reports whether `key` holds a value in either layer.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidKey`] for a malformed key.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.exists_with_options(key, &CacheOptions::new()).await
    }

    /// Like [`exists`](Self::exists), for a key written under `options.namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidKey`] for a malformed key.
    pub async fn exists_with_options(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        validate_key(key)?;
        let origin = EntryKey::new(key, options);
        let now = self.inner.clock.instant();
        if self.inner.local.lock().contains_valid(&origin.local(), now) {
            return Ok(true);
        }

        match self.inner.adapter.exists(key, &origin.adapter_options()).await {
            Ok(exists) => Ok(exists),
            Err(error) => {
                self.absorb(CacheOperation::Exists, Some(key), &error);
                Ok(false)
            }
        }
    }

    /// Reads many keys at once.
    ///
    /// Local hits are served first; the rest are fetched from the adapter in one
    /// batch and promoted with the default TTL and their stored tags. `missing`
    /// lists absent keys in request order.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidKey`] if any key is malformed.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[&str]) -> Result<BatchGet<T>> {
        for key in keys {
            validate_key(key)?;
        }

        let now = self.inner.clock.instant();
        let mut values: Vec<(String, Arc<Value>)> = Vec::with_capacity(keys.len());
        let mut pending = Vec::new();
        {
            let mut local = self.inner.local.lock();
            for key in keys {
                match local.get(key, now) {
                    LocalRead::Hit(value) => values.push(((*key).to_string(), value)),
                    LocalRead::Expired | LocalRead::Miss => pending.push((*key).to_string()),
                }
            }
        }

        if !pending.is_empty() {
            match self.inner.adapter.mget(&pending).await {
                Ok(batch) => {
                    for (key, AdapterEntry { value, tags }) in batch.found {
                        let value = Arc::new(value);
                        let promote = CacheOptions { tags, ..CacheOptions::new() };
                        self.store_local(EntryKey::from(key.as_str()), Arc::clone(&value), &promote);
                        values.push((key, value));
                    }
                }
                Err(error) => self.absorb(CacheOperation::Mget, None, &error),
            }
        }

        let mut result = BatchGet::default();
        for (key, value) in values {
            if let Some(value) = self.decode(&key, &value) {
                result.found.insert(key, value);
            }
        }
        result.missing = keys
            .iter()
            .filter(|key| !result.found.contains_key(**key))
            .map(|key| (*key).to_string())
            .collect();
        self.record(Event::new(CacheOperation::Mget, CacheActivity::Ok));
        Ok(result)
    }

    /// Writes many entries at once.
    ///
    /// Entries without their own TTL or tags take them from `options`. Returns the
    /// number of entries the adapter stored; an adapter failure returns zero and
    /// leaves the local layer untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidKey`] if any key is malformed.
    pub async fn mset(&self, entries: &[BatchEntry], options: &CacheOptions) -> Result<usize> {
        for entry in entries {
            validate_key(&entry.key)?;
        }

        let default_ttl = options.ttl_or(self.inner.config.settings.default_ttl);
        let resolved: Vec<BatchEntry> = entries
            .iter()
            .map(|entry| BatchEntry {
                ttl: Some(entry.ttl.unwrap_or(default_ttl)),
                tags: if entry.tags.is_empty() {
                    options.tags.clone()
                } else {
                    entry.tags.clone()
                },
                ..entry.clone()
            })
            .collect();

        match self.inner.adapter.mset(&resolved).await {
            Ok(stored) => {
                for entry in resolved {
                    let entry_options = CacheOptions {
                        ttl: entry.ttl,
                        tags: entry.tags,
                        ..CacheOptions::new()
                    };
                    self.store_local(EntryKey::from(entry.key.as_str()), Arc::new(entry.value), &entry_options);
                }
                self.record(Event::new(CacheOperation::Mset, CacheActivity::Inserted));
                Ok(stored)
            }
            Err(error) => {
                self.absorb(CacheOperation::Mset, None, &error);
                Ok(0)
            }
        }
    }

    /// Removes every entry tagged with `tag`. See [`invalidate_by_tags`](Self::invalidate_by_tags).
    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        self.invalidate_by_tags(&[tag]).await
    }

    /// Removes every entry carrying any of `tags` from both layers.
    ///
    /// Returns the adapter's count plus the local count. The two layers hold
    /// different subsets of the entries, so the sum is a total of removals, not a
    /// number of distinct keys.
    pub async fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let tags: Vec<String> = tags.iter().map(|tag| tag.as_ref().to_string()).collect();

        let remote = match self.inner.adapter.invalidate_by_tags(&tags).await {
            Ok(removed) => removed,
            Err(error) => {
                self.absorb(CacheOperation::InvalidateTags, None, &error);
                0
            }
        };
        let (local, len) = {
            let mut layer = self.inner.local.lock();
            (layer.invalidate_tags(&tags), layer.len())
        };

        self.record(Event::new(CacheOperation::InvalidateTags, CacheActivity::Invalidated));
        self.inner.telemetry.record_size(len);
        remote + local
    }

    /// Deletes every local key matching the regular expression `pattern`.
    ///
    /// Only the local layer is searched, namespaced entries by their
    /// `namespace:key` form; each match is then deleted from both layers, in the
    /// namespace it was written under. Returns the number of matched keys.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidPattern`] when `pattern` does not compile.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(|error| Error::caused_by(ErrorKind::InvalidPattern, error))?;
        let matched = self.inner.local.lock().matching_keys(&regex);

        for origin in &matched {
            self.remove_everywhere(origin).await;
        }
        self.record(Event::new(CacheOperation::InvalidatePattern, CacheActivity::Invalidated));
        Ok(matched.len())
    }

    /// Returns the number of entries in the local layer, expired ones included.
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.inner.local.lock().len()
    }

    /// Reports whether the cache is open and its adapter answers a health probe.
    pub async fn is_healthy(&self) -> bool {
        !self.inner.closed.load(Ordering::Acquire) && self.inner.adapter.health_check().await.healthy
    }

    /// Empties both layers.
    ///
    /// # Errors
    ///
    /// Unlike every other operation, an adapter failure is returned, as
    /// [`ErrorKind::Adapter`]. The local layer is emptied either way.
    pub async fn clear(&self) -> Result<()> {
        self.inner.local.lock().clear();
        self.inner.telemetry.record_size(0);

        if let Err(error) = self.inner.adapter.clear().await {
            self.absorb(CacheOperation::Clear, None, &error);
            return Err(Error::caused_by(ErrorKind::Adapter, error));
        }
        self.record(Event::new(CacheOperation::Clear, CacheActivity::Ok));
        Ok(())
    }

    /// Stops background tasks and closes the adapter.
    ///
    /// Calling `close` more than once has no further effect.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.background.lock().clear();
        self.inner.adapter.close().await;
        self.record(Event::new(CacheOperation::Close, CacheActivity::Ok));
    }

    /// Reads `key` from the local layer, then the adapter.
    async fn lookup(&self, key: &str, options: &CacheOptions) -> Result<Option<Arc<Value>>> {
        validate_key(key)?;
        let origin = EntryKey::new(key, options);
        let now = self.inner.clock.instant();

        let read = self.inner.local.lock().get(&origin.local(), now);
        match read {
            LocalRead::Hit(value) => {
                self.record(Event::new(CacheOperation::Get, CacheActivity::Hit).key(key));
                return Ok(Some(value));
            }
            LocalRead::Expired => self.record(Event::new(CacheOperation::Get, CacheActivity::Expired).key(key)),
            LocalRead::Miss => {}
        }

        match self.inner.adapter.get_entry(key, &self.adapter_options(options)).await {
            Ok(Some(AdapterEntry { value, mut tags })) => {
                self.record(Event::new(CacheOperation::Get, CacheActivity::AdapterHit).key(key));
                for tag in &options.tags {
                    if !tags.contains(tag) {
                        tags.push(tag.clone());
                    }
                }
                let value = Arc::new(value);
                let promote = CacheOptions { tags, ..options.clone() };
                self.store_local(origin, Arc::clone(&value), &promote);
                Ok(Some(value))
            }
            Ok(None) => {
                self.record(Event::new(CacheOperation::Get, CacheActivity::Miss).key(key));
                Ok(None)
            }
            Err(error) => {
                self.absorb(CacheOperation::Get, Some(key), &error);
                Ok(None)
            }
        }
    }

    async fn remove_everywhere(&self, origin: &EntryKey) -> bool {
        let key = origin.key.as_str();
        let removed_locally = self.inner.local.lock().remove(&origin.local());

        let removed = match self.inner.adapter.delete(key, &origin.adapter_options()).await {
            Ok(removed) => removed,
            Err(error) => {
                self.absorb(CacheOperation::Delete, Some(key), &error);
                false
            }
        };
        if removed || removed_locally {
            self.record(Event::new(CacheOperation::Delete, CacheActivity::Invalidated).key(key));
        }
        removed
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, value: &Value) -> Option<T> {
        match T::deserialize(value) {
            Ok(value) => Some(value),
            Err(error) => {
                self.absorb(CacheOperation::Get, Some(key), &error);
                None
            }
        }
    }

    fn store_local(&self, origin: EntryKey, value: Arc<Value>, options: &CacheOptions) {
        let ttl = options.ttl_or(self.inner.config.settings.default_ttl);
        let now = self.inner.clock.instant();
        let (evicted, len) = {
            let mut local = self.inner.local.lock();
            let evicted = local.insert(origin, value, ttl, options.tags.clone(), now);
            (evicted, local.len())
        };

        if let Some(evicted) = evicted {
            self.record(Event::new(CacheOperation::Set, CacheActivity::Evicted).key(&evicted));
        }
        self.inner.telemetry.record_size(len);
    }

    /// Fills the fields the adapter needs from configuration.
    fn adapter_options(&self, options: &CacheOptions) -> CacheOptions {
        let settings = &self.inner.config.settings;
        CacheOptions {
            ttl: Some(options.ttl_or(settings.default_ttl)),
            compress: options.compress.or(Some(settings.enable_compression)),
            serialize: options.serialize.or(Some(settings.enable_serialization)),
            ..options.clone()
        }
    }

    fn finish(&self, operation: CacheOperation, key: &str, elapsed: Duration) {
        let activity = if elapsed > SLOW_CALL_THRESHOLD {
            CacheActivity::Slow
        } else {
            CacheActivity::Ok
        };
        self.record(Event::new(operation, activity).key(key).duration(elapsed));
    }

    pub(crate) fn absorb(&self, operation: CacheOperation, key: Option<&str>, error: &dyn Display) {
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
        self.inner.telemetry.record_failure(operation, key, error);
    }

    pub(crate) fn record(&self, event: Event<'_>) {
        self.inner.telemetry.record(event);
    }
}
