// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Orchestrator configuration.
//!
//! [`CacheSettings`] is the plain-data part of the configuration. It can be loaded
//! from a file with any `serde` format and handed to
//! [`TieredCacheBuilder::settings`](crate::TieredCacheBuilder::settings). Durations
//! are written as whole seconds.
//!
//! [`CacheConfig`] is the frozen snapshot an orchestrator runs with, readable
//! through [`TieredCache::config`](crate::TieredCache::config).

use std::time::Duration;

use layercache_adapter::AdapterKind;
use serde::{Deserialize, Serialize, Serializer};

/// Validity window used when a call sets no TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Local layer capacity used when none is configured.
pub const DEFAULT_MAX_MEMORY_ENTRIES: usize = 10_000;

/// Period of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Period of the background warmup.
pub const DEFAULT_WARMUP_INTERVAL: Duration = Duration::from_secs(300);

/// Reads slower than this are reported with a warning.
pub const SLOW_CALL_THRESHOLD: Duration = Duration::from_millis(100);

/// Tunables of a [`TieredCache`](crate::TieredCache).
///
/// Every field has a default, so a partial document deserializes.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use layercache::CacheSettings;
///
/// let settings: CacheSettings =
///     serde_json::from_str(r#"{ "default_ttl": 60, "test_mode": true }"#).unwrap();
///
/// assert_eq!(settings.default_ttl, Duration::from_secs(60));
/// assert_eq!(settings.max_memory_entries, 10_000);
/// assert!(settings.enable_compression);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct CacheSettings {
    /// TTL applied when a call does not set one.
    #[serde(with = "seconds")]
    pub default_ttl: Duration,
    /// Capacity of the local layer.
    pub max_memory_entries: usize,
    /// Whether adapters compress large payloads by default.
    pub enable_compression: bool,
    /// Whether adapters serialize values by default.
    pub enable_serialization: bool,
    /// Regular expressions applied by
    /// [`invalidate_configured_patterns`](crate::TieredCache::invalidate_configured_patterns).
    pub invalidation_patterns: Vec<String>,
    /// Period of the background expiry sweep.
    #[serde(with = "seconds")]
    pub sweep_interval: Duration,
    /// Period of the background warmup.
    #[serde(with = "seconds")]
    pub warmup_interval: Duration,
    /// Disables every background task.
    pub test_mode: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            max_memory_entries: DEFAULT_MAX_MEMORY_ENTRIES,
            enable_compression: true,
            enable_serialization: true,
            invalidation_patterns: Vec::new(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            warmup_interval: DEFAULT_WARMUP_INTERVAL,
            test_mode: false,
        }
    }
}

/// The configuration an orchestrator was built with.
///
/// Producers of warmup queries are not data, so only their keys are kept here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct CacheConfig {
    /// Name reported in telemetry.
    pub name: String,
    /// Tunables.
    #[serde(flatten)]
    pub settings: CacheSettings,
    /// Kind of the selected storage adapter.
    #[serde(serialize_with = "adapter_kind")]
    pub adapter: AdapterKind,
    /// Keys of the configured warmup queries.
    pub warmup_keys: Vec<String>,
}

fn adapter_kind<S: Serializer>(kind: &AdapterKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(kind.as_str())
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
