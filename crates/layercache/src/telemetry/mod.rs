// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache telemetry: structured `tracing` events and, with the `metrics` feature,
//! OpenTelemetry instruments.

use tracing::Level;

#[cfg(any(feature = "metrics", test))]
pub(crate) mod attributes;
mod cache;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

pub(crate) use cache::{CacheTelemetry, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Get,
    Set,
    Delete,
    Exists,
    Mget,
    Mset,
    InvalidateTags,
    InvalidatePattern,
    Warmup,
    Sweep,
    Clear,
    Close,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cache.get",
            Self::Set => "cache.set",
            Self::Delete => "cache.delete",
            Self::Exists => "cache.exists",
            Self::Mget => "cache.mget",
            Self::Mset => "cache.mset",
            Self::InvalidateTags => "cache.invalidate_tags",
            Self::InvalidatePattern => "cache.invalidate_pattern",
            Self::Warmup => "cache.warmup",
            Self::Sweep => "cache.sweep",
            Self::Clear => "cache.clear",
            Self::Close => "cache.close",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    /// Served from the local layer.
    Hit,
    /// Served from the storage adapter.
    AdapterHit,
    Miss,
    Expired,
    Inserted,
    Evicted,
    Invalidated,
    /// The fallback producer was invoked.
    Fallback,
    /// A produced value was written through both layers.
    FallbackPromotion,
    Ok,
    Slow,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::AdapterHit => "cache.adapter_hit",
            Self::Miss => "cache.miss",
            Self::Expired => "cache.expired",
            Self::Inserted => "cache.inserted",
            Self::Evicted => "cache.evicted",
            Self::Invalidated => "cache.invalidated",
            Self::Fallback => "cache.fallback",
            Self::FallbackPromotion => "cache.fallback_promotion",
            Self::Ok => "cache.ok",
            Self::Slow => "cache.slow",
            Self::Error => "cache.error",
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Hit | Self::AdapterHit | Self::Miss | Self::Ok => Level::DEBUG,
            Self::Expired | Self::Inserted | Self::Evicted | Self::Invalidated | Self::Fallback | Self::FallbackPromotion => {
                Level::INFO
            }
            Self::Slow => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }
}
