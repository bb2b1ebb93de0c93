// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use layercache_adapter::{DEFAULT_COMPRESSION_THRESHOLD, DynamicAdapter, DynamicAdapterExt, StorageAdapter};
use layercache_memory::{DEFAULT_NAMESPACE, MemoryAdapter};
use tick::Clock;

use crate::config::CacheSettings;

/// Chooses the storage adapter behind a [`TieredCache`](crate::TieredCache).
///
/// Selection happens once, when the cache is built. Afterwards the orchestrator only
/// sees a [`DynamicAdapter`] and learns what it talks to from
/// [`StorageAdapter::kind`](layercache_adapter::StorageAdapter::kind).
///
/// # Examples
///
/// ```
/// use layercache::AdapterSelection;
///
/// let selection = AdapterSelection::memory("orders").max_capacity(50_000);
/// # let _ = selection;
/// ```
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum AdapterSelection {
    /// The in-process reference adapter from `layercache_memory`.
    Memory {
        /// Namespace prefixed to every key.
        namespace: String,
        /// Upper bound on stored records; unbounded when `None`.
        max_capacity: Option<u64>,
        /// Encoded payloads of at least this many bytes are compressed.
        compression_threshold: usize,
    },
    /// Any other adapter.
    Custom(DynamicAdapter),
}

impl Default for AdapterSelection {
    fn default() -> Self {
        Self::memory(DEFAULT_NAMESPACE)
    }
}

impl AdapterSelection {
    /// Selects the in-process adapter with the given namespace.
    #[must_use]
    pub fn memory(namespace: impl Into<String>) -> Self {
        Self::Memory {
            namespace: namespace.into(),
            max_capacity: None,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
        }
    }

    /// Selects an already constructed adapter.
    #[must_use]
    pub fn custom(adapter: impl StorageAdapter + 'static) -> Self {
        Self::Custom(adapter.into_dynamic())
    }

    /// Bounds the in-process adapter; ignored for custom adapters.
    #[must_use]
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        if let Self::Memory { max_capacity, .. } = &mut self {
            *max_capacity = Some(capacity);
        }
        self
    }

    /// Sets the compression threshold of the in-process adapter; ignored for custom adapters.
    #[must_use]
    pub fn compression_threshold(mut self, threshold: usize) -> Self {
        if let Self::Memory { compression_threshold, .. } = &mut self {
            *compression_threshold = threshold;
        }
        self
    }

    pub(crate) fn resolve(self, clock: &Clock, settings: &CacheSettings) -> DynamicAdapter {
        match self {
            Self::Memory {
                namespace,
                max_capacity,
                compression_threshold,
            } => {
                let mut builder = MemoryAdapter::builder(clock)
                    .namespace(namespace)
                    .default_ttl(settings.default_ttl)
                    .compression(settings.enable_compression)
                    .compression_threshold(compression_threshold)
                    .serialization(settings.enable_serialization);
                if let Some(capacity) = max_capacity {
                    builder = builder.max_capacity(capacity);
                }
                builder.build().into_dynamic()
            }
            Self::Custom(adapter) => adapter,
        }
    }
}

impl From<DynamicAdapter> for AdapterSelection {
    fn from(adapter: DynamicAdapter) -> Self {
        Self::Custom(adapter)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use layercache_adapter::testing::MockAdapter;
    use layercache_adapter::AdapterKind;

    use super::*;

    #[test]
    fn default_is_memory_in_default_namespace() {
        match AdapterSelection::default() {
            AdapterSelection::Memory {
                namespace,
                max_capacity,
                compression_threshold,
            } => {
                assert_eq!(namespace, DEFAULT_NAMESPACE);
                assert_eq!(max_capacity, None);
                assert_eq!(compression_threshold, DEFAULT_COMPRESSION_THRESHOLD);
            }
            AdapterSelection::Custom(_) => panic!("expected the memory adapter"),
        }
    }

    #[test]
    fn resolves_to_reported_kind() {
        let clock = Clock::new_frozen();
        let settings = CacheSettings::default();

        let memory = AdapterSelection::memory("ns").max_capacity(10).resolve(&clock, &settings);
        assert_eq!(memory.kind(), AdapterKind::Memory);

        let mock = AdapterSelection::custom(MockAdapter::new(&clock)).resolve(&clock, &settings);
        assert_eq!(mock.kind(), AdapterKind::Mock);
    }

    #[test]
    fn memory_adapter_inherits_default_ttl() {
        let control = tick::ClockControl::new();
        let clock = control.to_clock();
        let settings = CacheSettings {
            default_ttl: Duration::from_secs(5),
            ..CacheSettings::default()
        };
        let adapter = AdapterSelection::default().resolve(&clock, &settings);

        futures::executor::block_on(async {
            adapter
                .set("k", &serde_json::json!(1), &layercache_adapter::CacheOptions::new())
                .await
                .unwrap();
            control.advance(Duration::from_secs(6));
            assert_eq!(adapter.get("k", &layercache_adapter::CacheOptions::new()).await.unwrap(), None);
        });
    }
}
