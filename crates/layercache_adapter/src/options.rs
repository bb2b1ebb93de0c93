// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-call options shared by the orchestrator and every storage adapter.

use std::time::Duration;

/// Overrides for a single cache operation.
///
/// Every field is optional; an unset field falls back to the configured default of
/// whichever component handles the call (the orchestrator for TTL and toggles, the
/// adapter for its namespace).
///
/// # Examples
///
/// ```
/// use layercache_adapter::CacheOptions;
/// use std::time::Duration;
///
/// let options = CacheOptions::new()
///     .ttl(Duration::from_secs(60))
///     .tag("users")
///     .namespace("tenant-a");
///
/// assert_eq!(options.ttl_or(Duration::from_secs(5)), Duration::from_secs(60));
/// assert_eq!(options.tags, vec!["users".to_string()]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Validity window of the written entry.
    pub ttl: Option<Duration>,
    /// Tags attached to the written entry for bulk invalidation.
    pub tags: Vec<String>,
    /// Logical cache the key belongs to.
    pub namespace: Option<String>,
    /// Whether large payloads are compressed.
    pub compress: Option<bool>,
    /// Whether values are serialized; when off, only strings pass through.
    pub serialize: Option<bool>,
}

impl CacheOptions {
    /// Creates empty options that defer to every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time-to-live.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Adds one tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replaces the tag list.
    #[must_use]
    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Turns compression on or off for this call.
    #[must_use]
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    /// Turns serialization on or off for this call.
    #[must_use]
    pub fn serialize(mut self, serialize: bool) -> Self {
        self.serialize = Some(serialize);
        self
    }

    /// Returns the TTL, or `default` when none was given.
    #[must_use]
    pub fn ttl_or(&self, default: Duration) -> Duration {
        self.ttl.unwrap_or(default)
    }
}
