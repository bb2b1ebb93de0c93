// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory adapters.
//!
//! This module provides a builder API for `MemoryAdapter` that abstracts
//! the underlying moka configuration, providing a stable API surface
//! without exposing moka's types.

use std::time::Duration;

use layercache_adapter::{Codec, DEFAULT_COMPRESSION_THRESHOLD};
use tick::Clock;

use crate::adapter::MemoryAdapter;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "cache";

/// TTL applied to writes that carry none.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Builder for configuring a `MemoryAdapter`.
///
/// # Examples
///
/// ```
/// use layercache_memory::MemoryAdapter;
/// use std::time::Duration;
/// use tick::Clock;
///
/// # fn example(clock: &Clock) {
/// let adapter = MemoryAdapter::builder(clock)
///     .namespace("sessions")
///     .max_capacity(10_000)
///     .default_ttl(Duration::from_secs(300))
///     .compression_threshold(4096)
///     .build();
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryAdapterBuilder {
    pub(crate) clock: Clock,
    pub(crate) namespace: String,
    pub(crate) default_ttl: Duration,
    pub(crate) max_capacity: Option<u64>,
    pub(crate) initial_capacity: Option<usize>,
    pub(crate) name: Option<String>,
    pub(crate) compress: bool,
    pub(crate) serialize: bool,
    pub(crate) compression_threshold: usize,
}

impl MemoryAdapterBuilder {
    /// Creates a builder with default settings.
    ///
    /// The defaults are an unbounded store in the `cache` namespace with a one hour
    /// TTL, JSON serialization, and compression of payloads of 1 KiB or more.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            namespace: DEFAULT_NAMESPACE.to_owned(),
            default_ttl: DEFAULT_TTL,
            max_capacity: None,
            initial_capacity: None,
            name: None,
            compress: true,
            serialize: true,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
        }
    }

    /// Sets the namespace that prefixes every stored key.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the TTL applied when a write carries none.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the maximum number of records.
    ///
    /// Once the capacity is reached, records are evicted using moka's `TinyLFU`
    /// policy. If not set, the store is unbounded.
    #[must_use]
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Sets the initial capacity (pre-allocation hint) for the store.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Sets a name for the underlying store, used in moka's debugging output.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enables or disables compression of large payloads.
    #[must_use]
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    /// Sets the payload size in bytes at which compression kicks in.
    #[must_use]
    pub fn compression_threshold(mut self, bytes: usize) -> Self {
        self.compression_threshold = bytes;
        self
    }

    /// Enables or disables JSON serialization of values.
    ///
    /// With serialization off only string values can be stored.
    #[must_use]
    pub fn serialization(mut self, enabled: bool) -> Self {
        self.serialize = enabled;
        self
    }

    pub(crate) fn codec(&self) -> Codec {
        Codec::new()
            .with_serialization(self.serialize)
            .with_compression(self.compress)
            .with_threshold(self.compression_threshold)
    }

    /// Builds the configured `MemoryAdapter`.
    #[must_use]
    pub fn build(self) -> MemoryAdapter {
        MemoryAdapter::from_builder(self)
    }
}
