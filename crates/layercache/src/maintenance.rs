// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Expiry sweeps, configured invalidation and the background tasks that run them.

use std::sync::{Arc, Weak};
use std::time::Duration;

use anyspawn::Spawner;
use futures::StreamExt;
use futures::channel::oneshot;
use futures::future::{Either, select};
use tick::{Clock, PeriodicTimer};

use crate::TieredCache;
use crate::cache::CacheInner;
use crate::telemetry::{CacheActivity, CacheOperation, Event};

#[derive(Clone, Copy, Debug)]
enum Task {
    Sweep,
    Warmup,
}

impl TieredCache {
    /// Removes every expired local entry and its tag memberships.
    ///
    /// The background sweep runs this on its interval; it can also be called directly.
    /// Returns the number of removed entries.
    pub fn sweep_expired(&self) -> usize {
        let now = self.inner.clock.instant();
        let (removed, len) = {
            let mut local = self.inner.local.lock();
            (local.sweep(now), local.len())
        };

        if removed > 0 {
            self.record(Event::new(CacheOperation::Sweep, CacheActivity::Expired));
        }
        self.inner.telemetry.record_size(len);
        removed
    }

    /// Applies every configured invalidation pattern.
    ///
    /// A pattern that does not compile is logged and skipped. Returns the total number
    /// of matched keys.
    pub async fn invalidate_configured_patterns(&self) -> usize {
        let mut total = 0;
        for pattern in &self.inner.config.settings.invalidation_patterns {
            match self.invalidate_by_pattern(pattern).await {
                Ok(matched) => total += matched,
                Err(error) => {
                    self.inner
                        .telemetry
                        .record_failure(CacheOperation::InvalidatePattern, Some(pattern), &error);
                }
            }
        }
        total
    }
}

/// Spawns the periodic sweep and, when queries are configured, the periodic warmup.
pub(crate) fn start(cache: &TieredCache, spawner: &Spawner) {
    let settings = &cache.inner.config.settings;
    let mut tasks = vec![(Task::Sweep, settings.sweep_interval)];
    if !cache.inner.warmup.is_empty() {
        tasks.push((Task::Warmup, settings.warmup_interval));
    }

    for (task, period) in tasks {
        let (stop_tx, stop_rx) = oneshot::channel();
        cache.inner.background.lock().push(stop_tx);
        let weak = Arc::downgrade(&cache.inner);
        let clock = cache.inner.clock.clone();
        drop(spawner.spawn(run(weak, clock, task, period, stop_rx)));
    }
}

/// Runs `task` every `period` until stopped or until the cache is gone.
async fn run(cache: Weak<CacheInner>, clock: Clock, task: Task, period: Duration, mut stop: oneshot::Receiver<()>) {
    let mut timer = PeriodicTimer::new(&clock, period);
    loop {
        // Stop wins over a tick that is ready at the same time.
        match select(&mut stop, timer.next()).await {
            Either::Right((Some(()), _)) => {}
            Either::Left(_) | Either::Right((None, _)) => break,
        }

        let Some(inner) = cache.upgrade() else { break };
        let cache = TieredCache { inner };
        match task {
            Task::Sweep => {
                cache.sweep_expired();
            }
            Task::Warmup => {
                cache.warmup_configured().await;
            }
        }
    }
}
