// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Proactive population of cache entries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use layercache_adapter::CacheOptions;
use serde::Serialize;
use serde_json::Value;

use crate::error::BoxError;
use crate::telemetry::{CacheActivity, CacheOperation, Event};
use crate::{Error, ErrorKind, TieredCache};

type Producer = Arc<dyn Fn() -> BoxFuture<'static, Result<Option<Value>, BoxError>> + Send + Sync>;

/// A key together with the producer that computes its value ahead of demand.
///
/// Queries registered on the builder are re-run by the background warmup task;
/// any list of queries can also be run once with [`TieredCache::warmup`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use layercache::WarmupQuery;
///
/// let query = WarmupQuery::new("config:flags", || async {
///     Ok::<_, std::io::Error>(Some(vec!["beta", "dark-mode"]))
/// })
/// .ttl(Duration::from_secs(600))
/// .tag("config");
///
/// assert_eq!(query.key(), "config:flags");
/// ```
#[derive(Clone)]
pub struct WarmupQuery {
    key: String,
    producer: Producer,
    options: CacheOptions,
}

impl WarmupQuery {
    /// Creates a query; the producer runs once per warmup.
    ///
    /// `Ok(None)` from the producer leaves the cache untouched.
    pub fn new<F, Fut, T, E>(key: impl Into<String>, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        T: Serialize + 'static,
        E: Into<BoxError> + 'static,
    {
        let producer: Producer = Arc::new(move || {
            producer()
                .map(|produced| -> Result<Option<Value>, BoxError> {
                    let produced = produced.map_err(Into::into)?;
                    produced.map(|value| serde_json::to_value(value).map_err(BoxError::from)).transpose()
                })
                .boxed()
        });
        Self {
            key: key.into(),
            producer,
            options: CacheOptions::new(),
        }
    }

    /// Sets the TTL of the produced entry.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = Some(ttl);
        self
    }

    /// Adds a tag to the produced entry.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.options.tags.push(tag.into());
        self
    }

    /// Returns the key this query fills.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for WarmupQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarmupQuery")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Outcome counts of one warmup run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct WarmupSummary {
    /// Queries whose value was written to the storage adapter.
    pub loaded: usize,
    /// Queries whose producer returned nothing.
    pub empty: usize,
    /// Queries whose producer or write failed.
    pub failed: usize,
}

enum Outcome {
    Loaded,
    Empty,
    Failed,
}

impl TieredCache {
    /// Runs every query concurrently and writes the produced values.
    ///
    /// Failures are isolated: a failing producer is logged and counted, and the other
    /// queries still complete.
    ///
    /// # Examples
    ///
    /// ```
    /// use layercache::{TieredCache, WarmupQuery};
    /// use tick::Clock;
    ///
    /// # futures::executor::block_on(async {
    /// let cache = TieredCache::builder(Clock::new_frozen()).test_mode(true).build();
    /// let queries = [
    ///     WarmupQuery::new("a", || async { Ok::<_, std::io::Error>(Some(1)) }),
    ///     WarmupQuery::new("b", || async { Ok::<Option<i32>, std::io::Error>(None) }),
    /// ];
    ///
    /// let summary = cache.warmup(&queries).await;
    /// assert_eq!((summary.loaded, summary.empty, summary.failed), (1, 1, 0));
    /// assert_eq!(cache.get::<i32>("a").await.unwrap(), Some(1));
    /// # });
    /// ```
    pub async fn warmup(&self, queries: &[WarmupQuery]) -> WarmupSummary {
        let outcomes = join_all(queries.iter().map(|query| self.warm_one(query))).await;

        let mut summary = WarmupSummary::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Loaded => summary.loaded += 1,
                Outcome::Empty => summary.empty += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }

        self.inner.telemetry.record(Event::new(CacheOperation::Warmup, CacheActivity::Ok));
        summary
    }

    /// Runs the queries registered on the builder.
    pub async fn warmup_configured(&self) -> WarmupSummary {
        self.warmup(&self.inner.warmup).await
    }

    async fn warm_one(&self, query: &WarmupQuery) -> Outcome {
        let produced = match (query.producer)().await {
            Ok(Some(value)) => value,
            Ok(None) => return Outcome::Empty,
            Err(error) => {
                let error = Error::caused_by(ErrorKind::Producer, error);
                self.inner
                    .telemetry
                    .record_failure(CacheOperation::Warmup, Some(&query.key), &error);
                return Outcome::Failed;
            }
        };

        match self.set_value(&query.key, produced, &query.options).await {
            Ok(true) => Outcome::Loaded,
            Ok(false) => Outcome::Failed,
            Err(error) => {
                self.inner
                    .telemetry
                    .record_failure(CacheOperation::Warmup, Some(&query.key), &error);
                Outcome::Failed
            }
        }
    }
}
