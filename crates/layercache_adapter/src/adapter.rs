// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The storage adapter contract.
//!
//! [`StorageAdapter`] is the seam at which a durable backend plugs into the
//! orchestrator. A remote key-value store, a relational table or the in-process
//! reference adapter all implement the same capability set.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::{AdapterEntry, AdapterStats, BatchEntry, BatchGet, CacheOptions, HealthStatus, Result};

/// Identifies the backend behind an adapter.
///
/// Adapters report their kind explicitly so that callers never need to inspect
/// concrete types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// In-process store.
    Memory,
    /// Remote key-value store.
    KeyValue,
    /// Relational-database-backed store.
    Relational,
    /// Test double.
    Mock,
    /// Any other backend, named by the implementor.
    Other(&'static str),
}

impl AdapterKind {
    /// Returns a stable, lowercase name for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::KeyValue => "key_value",
            Self::Relational => "relational",
            Self::Mock => "mock",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for durable cache backends.
///
/// Every operation may fail; the orchestrator turns failures into misses. Adapters
/// enforce expiry themselves: a read that finds an expired record reports it as
/// absent and removes it. Keys are scoped to the adapter's namespace unless the
/// call's [`CacheOptions::namespace`] overrides it.
///
/// Statistics, health and lifecycle methods are infallible: health reports failures
/// in its [`HealthStatus`], and `close` must be idempotent.
#[cfg_attr(
    any(test, feature = "dynamic-adapter"),
    dynosaur::dynosaur(pub(crate) DynStorageAdapter = dyn(box) StorageAdapter, bridge(none))
)]
pub trait StorageAdapter: Send + Sync {
    /// Reports which backend this is.
    fn kind(&self) -> AdapterKind;

    /// Reads an unexpired value.
    fn get(&self, key: &str, options: &CacheOptions) -> impl Future<Output = Result<Option<Value>>> + Send;

    /// Reads an unexpired value together with the tags it was stored under.
    fn get_entry(&self, key: &str, options: &CacheOptions) -> impl Future<Output = Result<Option<AdapterEntry>>> + Send;

    /// Upserts a value with the expiry and tags from `options`; returns `true` on success.
    fn set(&self, key: &str, value: &Value, options: &CacheOptions) -> impl Future<Output = Result<bool>> + Send;

    /// Removes a record from the call's namespace; returns `true` iff one existed.
    fn delete(&self, key: &str, options: &CacheOptions) -> impl Future<Output = Result<bool>> + Send;

    /// Returns `true` if an unexpired record exists in the call's namespace.
    fn exists(&self, key: &str, options: &CacheOptions) -> impl Future<Output = Result<bool>> + Send;

    /// Moves the expiry of an existing record; returns `false` if there is none.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<bool>> + Send;

    /// Adds `by` to a numeric record, creating it with value `by` and the default TTL if absent.
    fn increment(&self, key: &str, by: i64) -> impl Future<Output = Result<i64>> + Send;

    /// Subtracts `by` from a numeric record, creating it with value `-by` if absent.
    fn decrement(&self, key: &str, by: i64) -> impl Future<Output = Result<i64>> + Send;

    /// Reads many keys at once, each with the tags it was stored under.
    ///
    /// A record that cannot be decoded is reported as missing.
    fn mget(&self, keys: &[String]) -> impl Future<Output = Result<BatchGet<AdapterEntry>>> + Send;

    /// Writes many entries at once; returns how many were written.
    fn mset(&self, entries: &[BatchEntry]) -> impl Future<Output = Result<usize>> + Send;

    /// Removes many keys at once; returns how many existed.
    fn mdel(&self, keys: &[String]) -> impl Future<Output = Result<usize>> + Send;

    /// Lists keys matching a glob pattern, without the namespace prefix.
    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Removes every record carrying any of `tags`, whatever namespace it was written
    /// under; returns how many were removed.
    fn invalidate_by_tags(&self, tags: &[String]) -> impl Future<Output = Result<usize>> + Send;

    /// Removes every record in the adapter's namespace.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;

    /// Performs a cheap round trip against the backend.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;

    /// Releases backend resources. Calling it more than once is harmless.
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Returns the adapter's counters.
    fn stats(&self) -> AdapterStats;

    /// Zeroes the adapter's counters.
    fn reset_stats(&self);

    /// Returns the number of stored records, if the backend tracks it.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the adapter holds no records.
    ///
    /// Returns `None` for backends that don't track size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}
