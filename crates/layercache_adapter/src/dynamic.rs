// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Type-erased storage adapter.

use std::{fmt::Debug, sync::Arc, time::Duration};

use serde_json::Value;

use crate::adapter::DynStorageAdapter;
use crate::{AdapterEntry, AdapterKind, AdapterStats, BatchEntry, BatchGet, CacheOptions, HealthStatus, Result, StorageAdapter};

/// Extension trait for converting any `StorageAdapter` into a `DynamicAdapter`.
///
/// This trait is automatically implemented for all types that implement `StorageAdapter`.
pub trait DynamicAdapterExt: Sized {
    /// Converts this adapter into a `DynamicAdapter`.
    fn into_dynamic(self) -> DynamicAdapter;
}

impl<T> DynamicAdapterExt for T
where
    T: StorageAdapter + 'static,
{
    fn into_dynamic(self) -> DynamicAdapter {
        DynamicAdapter::new(self)
    }
}

/// A clonable storage adapter with type erasure.
///
/// `DynamicAdapter` wraps a trait object in an `Arc`, so the orchestrator can hold
/// whichever backend was selected at bootstrap without becoming generic over it.
/// Clones share the same backend.
pub struct DynamicAdapter(Arc<DynStorageAdapter<'static>>);

impl DynamicAdapter {
    /// Creates a dynamic adapter from any `StorageAdapter` implementation.
    pub fn new<T>(adapter: T) -> Self
    where
        T: StorageAdapter + 'static,
    {
        Self(DynStorageAdapter::new_arc(adapter))
    }
}

impl Debug for DynamicAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicAdapter").field("kind", &self.0.kind()).finish()
    }
}

impl Clone for DynamicAdapter {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl StorageAdapter for DynamicAdapter {
    fn kind(&self) -> AdapterKind {
        self.0.kind()
    }

    async fn get(&self, key: &str, options: &CacheOptions) -> Result<Option<Value>> {
        self.0.get(key, options).await
    }

    async fn get_entry(&self, key: &str, options: &CacheOptions) -> Result<Option<AdapterEntry>> {
        self.0.get_entry(key, options).await
    }

    async fn set(&self, key: &str, value: &Value, options: &CacheOptions) -> Result<bool> {
        self.0.set(key, value, options).await
    }

    async fn delete(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        self.0.delete(key, options).await
    }

    async fn exists(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        self.0.exists(key, options).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.0.expire(key, ttl).await
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        self.0.increment(key, by).await
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.0.decrement(key, by).await
    }

    async fn mget(&self, keys: &[String]) -> Result<BatchGet<AdapterEntry>> {
        self.0.mget(keys).await
    }

    async fn mset(&self, entries: &[BatchEntry]) -> Result<usize> {
        self.0.mset(entries).await
    }

    async fn mdel(&self, keys: &[String]) -> Result<usize> {
        self.0.mdel(keys).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.0.keys(pattern).await
    }

    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<usize> {
        self.0.invalidate_by_tags(tags).await
    }

    async fn clear(&self) -> Result<()> {
        self.0.clear().await
    }

    async fn health_check(&self) -> HealthStatus {
        self.0.health_check().await
    }

    async fn close(&self) {
        self.0.close().await;
    }

    fn stats(&self) -> AdapterStats {
        self.0.stats()
    }

    fn reset_stats(&self) {
        self.0.reset_stats();
    }

    fn len(&self) -> Option<u64> {
        self.0.len()
    }

    fn is_empty(&self) -> Option<bool> {
        self.0.is_empty()
    }
}
