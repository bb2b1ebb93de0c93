// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Memoization of async functions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use layercache_adapter::CacheOptions;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BoxError;
use crate::telemetry::{CacheActivity, CacheOperation, Event};
use crate::{Error, ErrorKind, Result, TieredCache};

type KeyFn<A> = Arc<dyn Fn(&A) -> Result<String> + Send + Sync>;

/// Settings of a [`Memoized`] function.
pub struct WrapOptions<A> {
    key_generator: Option<Arc<dyn Fn(&A) -> String + Send + Sync>>,
    options: CacheOptions,
}

impl<A> WrapOptions<A> {
    /// Creates options that use the default key and TTL.
    #[must_use]
    pub fn new() -> Self {
        Self {
            key_generator: None,
            options: CacheOptions::new(),
        }
    }

    /// Derives cache keys with `generator` instead of encoding the arguments.
    #[must_use]
    pub fn key_generator(mut self, generator: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    /// Sets the TTL of memoized results.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = Some(ttl);
        self
    }

    /// Tags memoized results.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.options.tags.push(tag.into());
        self
    }
}

impl<A> Default for WrapOptions<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for WrapOptions<A> {
    fn clone(&self) -> Self {
        Self {
            key_generator: self.key_generator.clone(),
            options: self.options.clone(),
        }
    }
}

impl<A> fmt::Debug for WrapOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapOptions")
            .field("key_generator", &self.key_generator.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// An async function whose results are cached by argument.
///
/// Created by [`TieredCache::wrap`].
pub struct Memoized<A, F> {
    cache: TieredCache,
    name: String,
    function: F,
    key: KeyFn<A>,
    options: CacheOptions,
}

impl<A, F> fmt::Debug for Memoized<A, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<A, F, Fut, T, E> Memoized<A, F>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Serialize + DeserializeOwned,
    E: Into<BoxError>,
{
    /// Returns the cached result for `args`, calling the function on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Producer`] when the function fails,
    /// [`ErrorKind::InvalidKey`] when the derived key is malformed and
    /// [`ErrorKind::InvalidValue`] when the arguments or the result cannot be serialized.
    pub async fn call(&self, args: A) -> Result<T> {
        let key = (self.key)(&args)?;
        if let Some(hit) = self.cache.get_with_options::<T>(&key, &self.options).await? {
            return Ok(hit);
        }

        self.cache
            .record(Event::new(CacheOperation::Get, CacheActivity::Fallback).key(&key));
        let value = (self.function)(args)
            .await
            .map_err(|error| Error::caused_by(ErrorKind::Producer, error))?;
        self.cache.set(&key, &value, &self.options).await?;
        Ok(value)
    }

    /// Returns the cache key `args` map to.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidValue`] when the default key cannot encode `args`.
    pub fn key_for(&self, args: &A) -> Result<String> {
        (self.key)(args)
    }

    /// Returns the name keys are prefixed with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TieredCache {
    /// Wraps `function` so its results are cached per argument value.
    ///
    /// The key is `name:` followed by the JSON encoding of the arguments, unless
    /// [`WrapOptions::key_generator`] supplies one. Pass a tuple to memoize a function
    /// of several arguments.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// use layercache::{TieredCache, WrapOptions};
    /// use tick::Clock;
    ///
    /// # futures::executor::block_on(async {
    /// let cache = TieredCache::builder(Clock::new_frozen()).test_mode(true).build();
    /// let calls = AtomicUsize::new(0);
    ///
    /// let square = cache.wrap(
    ///     "square",
    ///     |n: u64| {
    ///         calls.fetch_add(1, Ordering::SeqCst);
    ///         async move { Ok::<_, std::io::Error>(n * n) }
    ///     },
    ///     WrapOptions::new(),
    /// );
    ///
    /// assert_eq!(square.call(12).await?, 144);
    /// assert_eq!(square.call(12).await?, 144);
    /// assert_eq!(calls.load(Ordering::SeqCst), 1);
    /// assert_eq!(square.key_for(&12)?, "square:12");
    /// # Ok::<(), layercache::Error>(())
    /// # }).unwrap();
    /// ```
    pub fn wrap<A, F>(&self, name: impl Into<String>, function: F, options: WrapOptions<A>) -> Memoized<A, F>
    where
        A: Serialize + 'static,
    {
        let name = name.into();
        let key: KeyFn<A> = match options.key_generator {
            Some(generator) => Arc::new(move |args: &A| Ok(generator(args))),
            None => {
                let prefix = name.clone();
                Arc::new(move |args: &A| {
                    let encoded =
                        serde_json::to_string(args).map_err(|error| Error::caused_by(ErrorKind::InvalidValue, error))?;
                    Ok(format!("{prefix}:{encoded}"))
                })
            }
        };

        Memoized {
            cache: self.clone(),
            name,
            function,
            key,
            options: options.options,
        }
    }
}
