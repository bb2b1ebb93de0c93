// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock storage adapter for testing.
//!
//! This module provides `MockAdapter`, a configurable in-memory adapter that
//! records all operations and supports failure injection for testing error paths.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde_json::Value;
use tick::Clock;

use crate::keys::{glob_to_regex, namespaced_key};
use crate::{
    AdapterEntry, AdapterKind, AdapterStats, BatchEntry, BatchGet, CacheOptions, Error, HealthStatus, Result, StatsRecorder, StorageAdapter,
};

/// TTL used when neither the call nor the mock specifies one.
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Recorded adapter operation with full context.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOp {
    /// A get was performed with the given key.
    Get(String),
    /// A set was performed.
    Set {
        /// The key that was written.
        key: String,
        /// The value that was written.
        value: Value,
        /// The per-call TTL, if any.
        ttl: Option<Duration>,
        /// The tags attached to the record.
        tags: Vec<String>,
    },
    /// A delete was performed with the given key.
    Delete(String),
    /// An existence check was performed with the given key.
    Exists(String),
    /// An expiry change was performed.
    Expire(String, Duration),
    /// An increment (or, with a negative delta, decrement) was performed.
    Increment(String, i64),
    /// A batch read was performed.
    Mget(Vec<String>),
    /// A batch write was performed for the given keys.
    Mset(Vec<String>),
    /// A batch delete was performed.
    Mdel(Vec<String>),
    /// A key listing was performed with the given pattern.
    Keys(String),
    /// A tag invalidation was performed.
    InvalidateByTags(Vec<String>),
    /// A clear was performed.
    Clear,
    /// A health check was performed.
    HealthCheck,
    /// The adapter was closed.
    Close,
}

type FailPredicate = Box<dyn Fn(&AdapterOp) -> bool + Send + Sync>;

#[derive(Clone, Debug)]
struct MockRecord {
    value: Value,
    expires_at: std::time::SystemTime,
    tags: Vec<String>,
}

/// A configurable mock storage adapter for testing.
///
/// Values are kept in memory and expire against the supplied [`Clock`], so tests
/// driving a `ClockControl` see durable-layer expiry exactly when they advance time.
/// Every operation is recorded and any of them can be made to fail.
///
/// # Examples
///
/// ```ignore
/// use layercache_adapter::{testing::{AdapterOp, MockAdapter}, CacheOptions, StorageAdapter};
/// use serde_json::json;
/// use tick::Clock;
///
/// # async fn example(clock: Clock) {
/// let adapter = MockAdapter::new(&clock);
///
/// adapter.set("key", &json!(42), &CacheOptions::new()).await.unwrap();
/// assert_eq!(adapter.get("key", &CacheOptions::new()).await.unwrap(), Some(json!(42)));
///
/// // Fail reads of one key
/// adapter.fail_when(|op| matches!(op, AdapterOp::Get(k) if k == "forbidden"));
/// assert!(adapter.get("forbidden", &CacheOptions::new()).await.is_err());
/// # }
/// ```
pub struct MockAdapter {
    clock: Clock,
    default_ttl: Duration,
    data: Arc<Mutex<HashMap<String, MockRecord>>>,
    operations: Arc<Mutex<Vec<AdapterOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
    stats: Arc<StatsRecorder>,
}

impl std::fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAdapter")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Clone for MockAdapter {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            default_ttl: self.default_ttl,
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl MockAdapter {
    /// Creates a new empty mock adapter whose expiry follows `clock`.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            default_ttl: DEFAULT_TTL,
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            stats: Arc::new(StatsRecorder::new()),
        }
    }

    /// Sets the TTL applied when a call carries none.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Returns the number of stored records, expired ones included.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if a record is stored under `key`, expired or not.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Sets a predicate that determines when operations should fail.
    ///
    /// The predicate receives the operation and returns `true` if it should fail.
    /// Failing operations are still recorded.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&AdapterOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<AdapterOp> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Records `op` and fails it if the predicate says so.
    fn check(&self, op: AdapterOp) -> Result<()> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let name = op_name(&op);
        self.operations.lock().push(op);
        if fail {
            self.stats.error();
            return Err(Error::from_message(format!("mock: {name} failed")));
        }
        Ok(())
    }

    /// Returns the live record under `key`, dropping it if expired.
    fn live(&self, data: &mut HashMap<String, MockRecord>, key: &str) -> Option<MockRecord> {
        let now = self.clock.system_time();
        match data.get(key) {
            Some(record) if now >= record.expires_at => {
                data.remove(key);
                None
            }
            record => record.cloned(),
        }
    }

    fn store(&self, key: String, value: Value, ttl: Duration, tags: Vec<String>) {
        let now = self.clock.system_time();
        let expires_at = now.checked_add(ttl).unwrap_or(now);
        self.data.lock().insert(key, MockRecord { value, expires_at, tags });
    }
}

fn op_name(op: &AdapterOp) -> &'static str {
    match op {
        AdapterOp::Get(_) => "get",
        AdapterOp::Set { .. } => "set",
        AdapterOp::Delete(_) => "delete",
        AdapterOp::Exists(_) => "exists",
        AdapterOp::Expire(..) => "expire",
        AdapterOp::Increment(..) => "increment",
        AdapterOp::Mget(_) => "mget",
        AdapterOp::Mset(_) => "mset",
        AdapterOp::Mdel(_) => "mdel",
        AdapterOp::Keys(_) => "keys",
        AdapterOp::InvalidateByTags(_) => "invalidate_by_tags",
        AdapterOp::Clear => "clear",
        AdapterOp::HealthCheck => "health_check",
        AdapterOp::Close => "close",
    }
}

fn scoped(key: &str, options: &CacheOptions) -> String {
    options
        .namespace
        .as_deref()
        .map_or_else(|| key.to_owned(), |namespace| namespaced_key(namespace, key))
}

impl StorageAdapter for MockAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Mock
    }

    async fn get(&self, key: &str, options: &CacheOptions) -> Result<Option<Value>> {
        Ok(self.get_entry(key, options).await?.map(|entry| entry.value))
    }

    async fn get_entry(&self, key: &str, options: &CacheOptions) -> Result<Option<AdapterEntry>> {
        let key = scoped(key, options);
        self.check(AdapterOp::Get(key.clone()))?;
        let record = self.live(&mut self.data.lock(), &key);
        if record.is_some() {
            self.stats.hit();
        } else {
            self.stats.miss();
        }
        Ok(record.map(|record| AdapterEntry::new(record.value, record.tags)))
    }

    async fn set(&self, key: &str, value: &Value, options: &CacheOptions) -> Result<bool> {
        let key = scoped(key, options);
        self.check(AdapterOp::Set {
            key: key.clone(),
            value: value.clone(),
            ttl: options.ttl,
            tags: options.tags.clone(),
        })?;
        self.store(key, value.clone(), options.ttl_or(self.default_ttl), options.tags.clone());
        self.stats.set(1);
        Ok(true)
    }

    async fn delete(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        let key = scoped(key, options);
        self.check(AdapterOp::Delete(key.clone()))?;
        let existed = self.data.lock().remove(&key).is_some();
        if existed {
            self.stats.delete(1);
        }
        Ok(existed)
    }

    async fn exists(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        let key = scoped(key, options);
        self.check(AdapterOp::Exists(key.clone()))?;
        Ok(self.live(&mut self.data.lock(), &key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check(AdapterOp::Expire(key.to_owned(), ttl))?;
        let mut data = self.data.lock();
        if self.live(&mut data, key).is_none() {
            return Ok(false);
        }
        let now = self.clock.system_time();
        Ok(data.get_mut(key).is_some_and(|record| {
            record.expires_at = now.checked_add(ttl).unwrap_or(now);
            true
        }))
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        self.check(AdapterOp::Increment(key.to_owned(), by))?;
        let mut data = self.data.lock();
        let current = match self.live(&mut data, key) {
            Some(record) => record
                .value
                .as_i64()
                .ok_or_else(|| Error::from_message(format!("mock: value at '{key}' is not an integer")))?,
            None => 0,
        };
        let next = current.saturating_add(by);
        let now = self.clock.system_time();
        let record = data.entry(key.to_owned()).or_insert_with(|| MockRecord {
            value: Value::Null,
            expires_at: now.checked_add(self.default_ttl).unwrap_or(now),
            tags: Vec::new(),
        });
        record.value = Value::from(next);
        Ok(next)
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.increment(key, by.saturating_neg()).await
    }

    async fn mget(&self, keys: &[String]) -> Result<BatchGet<AdapterEntry>> {
        self.check(AdapterOp::Mget(keys.to_vec()))?;
        let mut data = self.data.lock();
        let mut batch = BatchGet::default();
        for key in keys {
            match self.live(&mut data, key) {
                Some(record) => {
                    self.stats.hit();
                    batch.found.insert(key.clone(), AdapterEntry::new(record.value, record.tags));
                }
                None => {
                    self.stats.miss();
                    batch.missing.push(key.clone());
                }
            }
        }
        Ok(batch)
    }

    async fn mset(&self, entries: &[BatchEntry]) -> Result<usize> {
        self.check(AdapterOp::Mset(entries.iter().map(|entry| entry.key.clone()).collect()))?;
        for entry in entries {
            self.store(
                entry.key.clone(),
                entry.value.clone(),
                entry.ttl.unwrap_or(self.default_ttl),
                entry.tags.clone(),
            );
        }
        self.stats.set(entries.len() as u64);
        Ok(entries.len())
    }

    async fn mdel(&self, keys: &[String]) -> Result<usize> {
        self.check(AdapterOp::Mdel(keys.to_vec()))?;
        let mut data = self.data.lock();
        let removed = keys.iter().filter(|key| data.remove(key.as_str()).is_some()).count();
        self.stats.delete(removed as u64);
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check(AdapterOp::Keys(pattern.to_owned()))?;
        let matcher = glob_to_regex(pattern)?;
        let now = self.clock.system_time();
        let mut keys: Vec<String> = self
            .data
            .lock()
            .iter()
            .filter(|(key, record)| now < record.expires_at && matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<usize> {
        self.check(AdapterOp::InvalidateByTags(tags.to_vec()))?;
        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|_, record| !record.tags.iter().any(|tag| tags.contains(tag)));
        let removed = before - data.len();
        self.stats.delete(removed as u64);
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.check(AdapterOp::Clear)?;
        self.data.lock().clear();
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.check(AdapterOp::HealthCheck) {
            Ok(()) => HealthStatus::healthy(Duration::ZERO),
            Err(error) => HealthStatus::unhealthy(error.to_string()),
        }
    }

    async fn close(&self) {
        self.operations.lock().push(AdapterOp::Close);
    }

    fn stats(&self) -> AdapterStats {
        self.stats.snapshot()
    }

    fn reset_stats(&self) {
        self.stats.reset();
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.lock().len() as u64)
    }
}
