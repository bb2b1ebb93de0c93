// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The bounded in-process layer.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use layercache_adapter::CacheOptions;
use layercache_adapter::keys::namespaced_key;
use regex::Regex;
use serde_json::Value;

use crate::tags::TagIndex;

/// The namespace and caller key an entry was written under.
///
/// Local entries are keyed by [`local`](Self::local); the pair is kept so that a
/// removal found through the local layer reaches the same adapter record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryKey {
    pub(crate) namespace: Option<String>,
    pub(crate) key: String,
}

impl EntryKey {
    pub(crate) fn new(key: &str, options: &CacheOptions) -> Self {
        Self {
            namespace: options.namespace.clone(),
            key: key.to_owned(),
        }
    }

    pub(crate) fn local(&self) -> String {
        match &self.namespace {
            Some(namespace) => namespaced_key(namespace, &self.key),
            None => self.key.clone(),
        }
    }

    /// Options addressing this entry's record in the adapter.
    pub(crate) fn adapter_options(&self) -> CacheOptions {
        CacheOptions {
            namespace: self.namespace.clone(),
            ..CacheOptions::new()
        }
    }
}

impl From<&str> for EntryKey {
    fn from(key: &str) -> Self {
        Self {
            namespace: None,
            key: key.to_owned(),
        }
    }
}

/// Outcome of a local lookup.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LocalRead {
    Hit(Arc<Value>),
    /// Present but past its TTL. Left in place for the sweep.
    Expired,
    Miss,
}

#[derive(Debug)]
struct LocalEntry {
    origin: EntryKey,
    value: Arc<Value>,
    created_at: Instant,
    accessed_at: Instant,
    access_count: u64,
    ttl: Duration,
    tags: Vec<String>,
    // Position in the recency order; breaks ties between equal access times.
    seq: u64,
    size: usize,
}

impl LocalEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }

    fn recency_key(&self) -> (Instant, u64) {
        (self.accessed_at, self.seq)
    }
}

/// In-process map with least-recently-accessed eviction and a tag index.
///
/// Recency is kept in an ordered map keyed by `(accessed_at, seq)`, so evicting the
/// oldest entry is a single ordered lookup rather than a scan. Exactly one entry is
/// evicted when an insert of a new key finds the layer full.
#[derive(Debug)]
pub(crate) struct LocalLayer {
    capacity: usize,
    entries: HashMap<String, LocalEntry>,
    recency: BTreeMap<(Instant, u64), String>,
    tags: TagIndex,
    next_seq: u64,
    hits: u64,
    requests: u64,
    estimated_bytes: usize,
}

impl LocalLayer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tags: TagIndex::default(),
            next_seq: 0,
            hits: 0,
            requests: 0,
            estimated_bytes: 0,
        }
    }

    /// Looks up `key`, counting the request and refreshing recency on a hit.
    pub(crate) fn get(&mut self, key: &str, now: Instant) -> LocalRead {
        self.requests += 1;
        let seq = self.bump_seq();
        let Some(entry) = self.entries.get_mut(key) else {
            return LocalRead::Miss;
        };
        if !entry.is_valid(now) {
            return LocalRead::Expired;
        }

        self.recency.remove(&entry.recency_key());
        entry.accessed_at = now;
        entry.seq = seq;
        entry.access_count += 1;
        self.recency.insert(entry.recency_key(), key.to_owned());
        self.hits += 1;
        LocalRead::Hit(Arc::clone(&entry.value))
    }

    /// Returns `true` if `key` holds a valid entry, without touching recency.
    pub(crate) fn contains_valid(&self, key: &str, now: Instant) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.is_valid(now))
    }

    /// Stores an entry, replacing any previous one with the same local key.
    ///
    /// Returns the key evicted to make room, if any. With zero capacity nothing is stored.
    pub(crate) fn insert(
        &mut self,
        origin: impl Into<EntryKey>,
        value: Arc<Value>,
        ttl: Duration,
        tags: Vec<String>,
        now: Instant,
    ) -> Option<String> {
        if self.capacity == 0 {
            return None;
        }

        let origin = origin.into();
        let local = origin.local();
        let key = local.as_str();
        let evicted = if self.remove_entry(key).is_none() && self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let size = key.len() + approximate_size(&value);
        let entry = LocalEntry {
            origin,
            value,
            created_at: now,
            accessed_at: now,
            access_count: 0,
            ttl,
            tags,
            seq: self.bump_seq(),
            size,
        };
        self.tags.add(key, &entry.tags);
        self.recency.insert(entry.recency_key(), key.to_owned());
        self.estimated_bytes += size;
        self.entries.insert(key.to_owned(), entry);
        evicted
    }

    /// Removes `key` and its tag memberships; returns `true` if it was present.
    pub(crate) fn remove(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Removes every entry carrying any of `tags`; returns how many were removed.
    pub(crate) fn invalidate_tags(&mut self, tags: &[String]) -> usize {
        self.tags
            .keys_for(tags)
            .into_iter()
            .filter(|key| self.remove_entry(key).is_some())
            .count()
    }

    /// Returns the origins of entries whose local key matches `pattern`, in no particular order.
    pub(crate) fn matching_keys(&self, pattern: &Regex) -> Vec<EntryKey> {
        self.entries
            .iter()
            .filter(|(key, _)| pattern.is_match(key))
            .map(|(_, entry)| entry.origin.clone())
            .collect()
    }

    /// Removes every expired entry; returns how many were removed.
    pub(crate) fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_valid(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove_entry(key);
        }
        expired.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.tags.clear();
        self.estimated_bytes = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn hits(&self) -> u64 {
        self.hits
    }

    pub(crate) fn requests(&self) -> u64 {
        self.requests
    }

    pub(crate) fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    #[cfg(test)]
    pub(crate) fn access_count(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.access_count)
    }

    #[cfg(test)]
    pub(crate) fn tags(&self) -> &TagIndex {
        &self.tags
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.recency.first_key_value()?;
        let key = key.clone();
        self.remove_entry(&key);
        Some(key)
    }

    fn remove_entry(&mut self, key: &str) -> Option<LocalEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.recency_key());
        self.tags.remove(key, &entry.tags);
        self.estimated_bytes = self.estimated_bytes.saturating_sub(entry.size);
        Some(entry)
    }
}

/// Rough in-memory footprint of a value, in bytes.
fn approximate_size(value: &Value) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Number(_) => 8,
        Value::String(s) => s.len() + 2,
        Value::Array(items) => 2 + items.iter().map(approximate_size).sum::<usize>(),
        Value::Object(fields) => {
            2 + fields
                .iter()
                .map(|(name, field)| name.len() + 3 + approximate_size(field))
                .sum::<usize>()
        }
    }
}
