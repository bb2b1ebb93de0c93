// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use layercache_adapter::CacheOptions;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BoxError;
use crate::{Result, TieredCache};

/// Named access to one logical cached value.
///
/// Created by [`TieredCache::cache_aside`]. Reads fall back to the fetch function
/// given at creation.
///
/// # Examples
///
/// ```
/// use layercache::{CacheOptions, TieredCache};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let cache = TieredCache::builder(Clock::new_frozen()).test_mode(true).build();
/// let flags = cache.cache_aside(
///     "feature-flags",
///     || async { Ok::<_, std::io::Error>(Some(vec!["beta".to_string()])) },
///     CacheOptions::new(),
/// );
///
/// assert_eq!(flags.get().await?, Some(vec!["beta".to_string()]));
/// flags.set(&vec!["beta".to_string(), "dark".to_string()]).await?;
/// assert_eq!(flags.get().await?.map(|f| f.len()), Some(2));
///
/// // Drops the stored value and fetches it again.
/// assert_eq!(flags.refresh().await?.map(|f| f.len()), Some(1));
/// # Ok::<(), layercache::Error>(())
/// # }).unwrap();
/// ```
pub struct CacheAside<F> {
    cache: TieredCache,
    key: String,
    fetch: F,
    options: CacheOptions,
}

impl<F> fmt::Debug for CacheAside<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheAside")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<F, Fut, T, E> CacheAside<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    T: Serialize + DeserializeOwned,
    E: Into<BoxError>,
{
    /// Returns the value, fetching and storing it on a miss.
    ///
    /// # Errors
    ///
    /// See [`TieredCache::get_or_insert_with`].
    pub async fn get(&self) -> Result<Option<T>> {
        self.cache.get_or_insert_with(&self.key, &self.fetch, &self.options).await
    }

    /// Stores `value`.
    ///
    /// # Errors
    ///
    /// See [`TieredCache::set`].
    pub async fn set(&self, value: &T) -> Result<bool> {
        self.cache.set(&self.key, value, &self.options).await
    }

    /// Removes the value from both layers.
    ///
    /// # Errors
    ///
    /// See [`TieredCache::delete`].
    pub async fn delete(&self) -> Result<bool> {
        self.cache.delete(&self.key).await
    }

    /// Deletes the value, then fetches it again.
    ///
    /// # Errors
    ///
    /// See [`TieredCache::get_or_insert_with`].
    pub async fn refresh(&self) -> Result<Option<T>> {
        self.delete().await?;
        self.get().await
    }

    /// Returns the key this handle reads and writes.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl TieredCache {
    /// Creates a [`CacheAside`] handle for `key`.
    pub fn cache_aside<F>(&self, key: impl Into<String>, fetch: F, options: CacheOptions) -> CacheAside<F> {
        CacheAside {
            cache: self.clone(),
            key: key.into(),
            fetch,
            options,
        }
    }
}
