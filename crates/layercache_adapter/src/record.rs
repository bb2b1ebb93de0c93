// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Durable records and batch result types.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};

use serde_json::Value;

/// A record as kept by a durable adapter.
///
/// The payload is already encoded (see [`Codec`](crate::Codec)); expiry is an absolute
/// timestamp so it survives process restarts in backends that persist it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    /// Key without the adapter's namespace prefix.
    pub key: String,
    /// Encoded value.
    pub payload: Vec<u8>,
    /// Absolute expiry timestamp.
    pub expires_at: SystemTime,
    /// Tags used by [`invalidate_by_tags`](crate::StorageAdapter::invalidate_by_tags).
    pub tags: Vec<String>,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
    /// When the key was first written.
    pub created_at: SystemTime,
    /// When the record was last written or had its expiry changed.
    pub updated_at: SystemTime,
}

impl StoredRecord {
    /// Creates a record written at `now` that expires `ttl` later.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: Vec<u8>, tags: Vec<String>, now: SystemTime, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            payload,
            expires_at: expiry_after(now, ttl),
            tags,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` once `now` has reached the expiry timestamp.
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the record carries any of `tags`.
    #[must_use]
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|tag| tags.contains(tag))
    }

    /// Moves the expiry to `ttl` after `now`.
    pub fn refresh_expiry(&mut self, now: SystemTime, ttl: Duration) {
        self.expires_at = expiry_after(now, ttl);
        self.updated_at = now;
    }

    /// Carries the creation time and metadata of a record this one replaces.
    #[must_use]
    pub fn replacing(mut self, previous: &Self) -> Self {
        self.created_at = previous.created_at;
        for (k, v) in &previous.metadata {
            self.metadata.entry(k.clone()).or_insert_with(|| v.clone());
        }
        self
    }
}

fn expiry_after(now: SystemTime, ttl: Duration) -> SystemTime {
    // Unrepresentable deadlines clamp to roughly 136 years out.
    now.checked_add(ttl)
        .or_else(|| now.checked_add(Duration::from_secs(u64::from(u32::MAX))))
        .unwrap_or(now)
}

/// Result of a batch read.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchGet<V = Value> {
    /// Keys that were present and unexpired, with their values.
    pub found: HashMap<String, V>,
    /// Keys that were absent, in request order.
    pub missing: Vec<String>,
}

// Manual so that an empty batch needs no `V: Default`.
impl<V> Default for BatchGet<V> {
    fn default() -> Self {
        Self {
            found: HashMap::new(),
            missing: Vec::new(),
        }
    }
}

/// One entry of a batch write.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchEntry {
    /// Key to write.
    pub key: String,
    /// Value to write.
    pub value: Value,
    /// Validity window; `None` uses the adapter default.
    pub ttl: Option<Duration>,
    /// Tags for the written record.
    pub tags: Vec<String>,
}

impl BatchEntry {
    /// Creates an untagged entry that uses the default TTL.
    #[must_use]
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            ttl: None,
            tags: Vec::new(),
        }
    }

    /// Sets the TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// A value read back from an adapter with the tags it was stored under.
#[derive(Clone, Debug, PartialEq)]
pub struct AdapterEntry {
    /// The decoded value.
    pub value: Value,
    /// Tags attached when the value was written.
    pub tags: Vec<String>,
}

impl AdapterEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(value: Value, tags: Vec<String>) -> Self {
        Self { value, tags }
    }
}

/// Outcome of an adapter health probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthStatus {
    /// Whether the round trip succeeded.
    pub healthy: bool,
    /// Round-trip time, when it could be measured.
    pub latency: Option<Duration>,
    /// Failure description for unhealthy adapters.
    pub error: Option<String>,
}

impl HealthStatus {
    /// A successful probe.
    #[must_use]
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            latency: Some(latency),
            error: None,
        }
    }

    /// A failed probe.
    #[must_use]
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_expires_at_ttl_boundary() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let record = StoredRecord::new("k", b"1".to_vec(), Vec::new(), now, Duration::from_secs(10));

        assert!(!record.is_expired(now + Duration::from_secs(9)));
        assert!(record.is_expired(now + Duration::from_secs(10)));
    }

    #[test]
    fn replacing_keeps_creation_time_and_metadata() {
        let first = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        let second = first + Duration::from_secs(5);

        let mut old = StoredRecord::new("k", b"1".to_vec(), Vec::new(), first, Duration::from_secs(60));
        old.metadata.insert("origin".into(), "import".into());
        let new = StoredRecord::new("k", b"2".to_vec(), Vec::new(), second, Duration::from_secs(60)).replacing(&old);

        assert_eq!(new.created_at, first);
        assert_eq!(new.updated_at, second);
        assert_eq!(new.metadata.get("origin").map(String::as_str), Some("import"));
    }

    #[test]
    fn refresh_expiry_moves_deadline() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let mut record = StoredRecord::new("k", Vec::new(), Vec::new(), now, Duration::from_secs(1));
        record.refresh_expiry(now + Duration::from_secs(1), Duration::from_secs(30));

        assert!(!record.is_expired(now + Duration::from_secs(20)));
        assert_eq!(record.updated_at, now + Duration::from_secs(1));
    }

    #[test]
    fn empty_batch_needs_no_default_values() {
        struct Opaque;

        let batch = BatchGet::<Opaque>::default();
        assert!(batch.found.is_empty());
        assert!(batch.missing.is_empty());
    }

    #[test]
    fn has_any_tag_checks_intersection() {
        let now = SystemTime::UNIX_EPOCH;
        let record = StoredRecord::new("k", Vec::new(), vec!["a".into(), "b".into()], now, Duration::from_secs(1));

        assert!(record.has_any_tag(&["b".into(), "z".into()]));
        assert!(!record.has_any_tag(&["z".into()]));
    }
}
