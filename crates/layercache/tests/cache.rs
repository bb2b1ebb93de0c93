// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the `TieredCache` read, write and invalidation protocol.

use std::error::Error as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use layercache::{BatchEntry, CacheOptions, Error, ErrorKind, TieredCache, WarmupQuery};
use layercache_adapter::StorageAdapter;
use layercache_adapter::testing::{AdapterOp, MockAdapter};
use rstest::rstest;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tick::{Clock, ClockControl};

type TestResult = Result<(), Error>;

fn block_on<F: Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn memory_cache(clock: Clock) -> TieredCache {
    TieredCache::builder(clock).test_mode(true).build()
}

fn mock_cache(clock: &Clock) -> (TieredCache, MockAdapter) {
    let mock = MockAdapter::new(clock);
    let cache = TieredCache::builder(clock.clone()).storage(mock.clone()).test_mode(true).build();
    (cache, mock)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
}

#[test]
fn never_written_keys_are_absent() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        assert_eq!(cache.get::<String>("nobody").await?, None);
        assert!(!cache.exists("nobody").await?);
        Ok(())
    })
}

#[rstest]
#[case::one_second(Duration::from_secs(1))]
#[case::one_minute(Duration::from_secs(60))]
#[case::one_day(Duration::from_secs(86_400))]
fn set_then_get_returns_the_value(#[case] ttl: Duration) -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        assert!(cache.set("k", &json!({"n": 1}), &CacheOptions::new().ttl(ttl)).await?);
        assert_eq!(cache.get::<serde_json::Value>("k").await?, Some(json!({"n": 1})));
        Ok(())
    })
}

#[test]
fn entries_expire_after_their_ttl() -> TestResult {
    let control = ClockControl::new();
    let (cache, mock) = mock_cache(&control.to_clock());

    block_on(async {
        cache.set("k", "v", &CacheOptions::new().ttl(Duration::from_secs(10))).await?;
        control.advance(Duration::from_secs(9));
        assert_eq!(cache.get::<String>("k").await?, Some("v".to_string()));

        control.advance(Duration::from_secs(1));
        assert!(mock.contains_key("k"), "durable record is still physically present");
        assert_eq!(cache.get::<String>("k").await?, None);
        Ok(())
    })
}

#[test]
fn expired_entries_trigger_the_fallback() -> TestResult {
    let control = ClockControl::new();
    let cache = memory_cache(control.to_clock());
    let options = CacheOptions::new().ttl(Duration::from_secs(5));

    block_on(async {
        cache.set("k", &1, &options).await?;
        control.advance(Duration::from_secs(6));
        let value = cache
            .get_or_insert_with("k", || async { Ok::<_, std::io::Error>(Some(2)) }, &options)
            .await?;
        assert_eq!(value, Some(2));
        Ok(())
    })
}

#[test]
fn tag_invalidation_removes_tagged_entries() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        cache.set("a", &1, &CacheOptions::new().tag("t")).await?;
        cache.set("b", &2, &CacheOptions::new().tags(["t", "other"])).await?;
        cache.set("c", &3, &CacheOptions::new().tag("other")).await?;

        cache.invalidate_by_tag("t").await;

        assert_eq!(cache.get::<i32>("a").await?, None);
        assert_eq!(cache.get::<i32>("b").await?, None);
        assert_eq!(cache.get::<i32>("c").await?, Some(3));
        Ok(())
    })
}

#[test]
fn tag_invalidation_sums_both_layers() -> TestResult {
    let clock = Clock::new_frozen();
    let (cache, mock) = mock_cache(&clock);

    block_on(async {
        // Only in the adapter.
        mock.set("remote", &json!(1), &CacheOptions::new().tag("t")).await.unwrap();
        // In both layers.
        cache.set("both", &2, &CacheOptions::new().tag("t")).await?;

        assert_eq!(cache.invalidate_by_tags(&["t"]).await, 3);
        assert_eq!(mock.entry_count(), 0);
        assert_eq!(cache.local_len(), 0);
        Ok(())
    })
}

#[test]
fn user_scenario() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        let ada = User { name: "Ada".to_string() };

        cache
            .set("user:1", &ada, &CacheOptions::new().ttl(Duration::from_secs(60)).tag("users"))
            .await?;
        assert_eq!(cache.get::<User>("user:1").await?, Some(ada));

        cache.invalidate_by_tag("users").await;
        assert_eq!(cache.get::<User>("user:1").await?, None);
        Ok(())
    })
}

#[test]
fn delete_twice_returns_true_then_false() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        cache.set("k", &1, &CacheOptions::new()).await?;

        assert!(cache.delete("k").await?);
        assert!(!cache.delete("k").await?);
        assert_eq!(cache.get::<i32>("k").await?, None);
        Ok(())
    })
}

#[test]
fn full_local_layer_evicts_the_first_inserted_key() -> TestResult {
    let clock = Clock::new_frozen();
    let mock = MockAdapter::new(&clock);
    let cache = TieredCache::builder(clock)
        .storage(mock.clone())
        .max_memory_entries(3)
        .test_mode(true)
        .build();

    block_on(async {
        for (i, key) in ["k0", "k1", "k2", "k3"].into_iter().enumerate() {
            cache.set(key, &i, &CacheOptions::new()).await?;
        }
        assert_eq!(cache.local_len(), 3);

        mock.clear_operations();
        for key in ["k1", "k2", "k3"] {
            assert!(cache.get::<usize>(key).await?.is_some());
        }
        assert!(mock.operations().is_empty(), "survivors are served locally");

        assert_eq!(cache.get::<usize>("k0").await?, Some(0));
        assert_eq!(mock.operations(), vec![AdapterOp::Get("k0".to_string())]);
        Ok(())
    })
}

#[test]
fn fallback_runs_once_and_its_value_is_cached() -> TestResult {
    let calls = AtomicUsize::new(0);
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        let produce = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(Some("computed".to_string()))
        };

        let first = cache.get_or_insert_with("missing", produce, &CacheOptions::new()).await?;
        let second = cache.get_or_insert_with("missing", produce, &CacheOptions::new()).await?;

        assert_eq!(first.as_deref(), Some("computed"));
        assert_eq!(second.as_deref(), Some("computed"));
        assert_eq!(cache.get::<String>("missing").await?.as_deref(), Some("computed"));
        Ok::<_, Error>(())
    })?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn producer_errors_propagate_with_their_source() {
    let cache = memory_cache(Clock::new_frozen());
    let error = block_on(cache.get_or_insert_with(
        "k",
        || async { Err::<Option<i32>, _>(std::io::Error::other("backend down")) },
        &CacheOptions::new(),
    ))
    .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Producer);
    assert!(error.source().is_some_and(|source| source.to_string().contains("backend down")));
    assert_eq!(cache.local_len(), 0);
}

#[test]
fn absent_producer_result_is_not_cached() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        let value = cache
            .get_or_insert_with("k", || async { Ok::<Option<i32>, std::io::Error>(None) }, &CacheOptions::new())
            .await?;
        assert_eq!(value, None);
        assert!(!cache.exists("k").await?);
        Ok(())
    })
}

#[test]
fn mget_splits_found_and_missing() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        cache.set("b", "bee", &CacheOptions::new()).await?;

        let batch = cache.mget::<String>(&["a", "b", "c"]).await?;

        assert_eq!(batch.found.len(), 1);
        assert_eq!(batch.found["b"], "bee");
        assert_eq!(batch.missing, vec!["a".to_string(), "c".to_string()]);
        Ok(())
    })
}

#[test]
fn mget_promotes_adapter_hits() -> TestResult {
    let clock = Clock::new_frozen();
    let (cache, mock) = mock_cache(&clock);

    block_on(async {
        mock.set("remote", &json!(5), &CacheOptions::new()).await.unwrap();
        cache.set("local", &6, &CacheOptions::new()).await?;
        mock.clear_operations();

        let batch = cache.mget::<i32>(&["local", "remote"]).await?;
        assert_eq!(batch.found.len(), 2);
        assert!(batch.missing.is_empty());
        assert_eq!(mock.operations(), vec![AdapterOp::Mget(vec!["remote".to_string()])]);
        assert_eq!(cache.local_len(), 2);
        Ok(())
    })
}

#[test]
fn mset_applies_shared_options() -> TestResult {
    let control = ClockControl::new();
    let cache = memory_cache(control.to_clock());

    block_on(async {
        let entries = [
            BatchEntry::new("a", json!(1)),
            BatchEntry::new("b", json!(2)).with_ttl(Duration::from_secs(100)),
        ];
        let stored = cache
            .mset(&entries, &CacheOptions::new().ttl(Duration::from_secs(10)).tag("batch"))
            .await?;
        assert_eq!(stored, 2);

        control.advance(Duration::from_secs(11));
        assert_eq!(cache.get::<i32>("a").await?, None);
        assert_eq!(cache.get::<i32>("b").await?, Some(2));

        cache.invalidate_by_tag("batch").await;
        assert_eq!(cache.get::<i32>("b").await?, None);
        Ok(())
    })
}

#[test]
fn pattern_invalidation_deletes_matches_from_both_layers() -> TestResult {
    let clock = Clock::new_frozen();
    let (cache, mock) = mock_cache(&clock);

    block_on(async {
        cache.set("session:1", &1, &CacheOptions::new()).await?;
        cache.set("session:2", &2, &CacheOptions::new()).await?;
        cache.set("user:1", &3, &CacheOptions::new()).await?;

        assert_eq!(cache.invalidate_by_pattern("^session:").await?, 2);
        assert!(!mock.contains_key("session:1"));
        assert!(!mock.contains_key("session:2"));
        assert!(mock.contains_key("user:1"));
        assert_eq!(cache.local_len(), 1);
        Ok(())
    })
}

#[test]
fn pattern_invalidation_only_searches_the_local_layer() -> TestResult {
    let clock = Clock::new_frozen();
    let (cache, mock) = mock_cache(&clock);

    block_on(async {
        mock.set("session:remote", &json!(1), &CacheOptions::new()).await.unwrap();
        assert_eq!(cache.invalidate_by_pattern("^session:").await?, 0);
        assert!(mock.contains_key("session:remote"));
        Ok(())
    })
}

#[test]
fn invalid_pattern_is_rejected() {
    let cache = memory_cache(Clock::new_frozen());
    let error = block_on(cache.invalidate_by_pattern("(unclosed")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidPattern);
}

#[rstest]
#[case::empty("")]
#[case::too_long(&"x".repeat(251))]
#[case::newline("a\nb")]
#[case::carriage_return("a\rb")]
fn malformed_keys_are_rejected(#[case] key: &str) {
    let cache = memory_cache(Clock::new_frozen());
    block_on(async {
        assert_eq!(cache.get::<i32>(key).await.unwrap_err().kind(), ErrorKind::InvalidKey);
        assert_eq!(cache.set(key, &1, &CacheOptions::new()).await.unwrap_err().kind(), ErrorKind::InvalidKey);
        assert_eq!(cache.delete(key).await.unwrap_err().kind(), ErrorKind::InvalidKey);
        assert_eq!(cache.exists(key).await.unwrap_err().kind(), ErrorKind::InvalidKey);
        assert_eq!(cache.mget::<i32>(&["ok", key]).await.unwrap_err().kind(), ErrorKind::InvalidKey);
    });
}

#[test]
fn adapter_outage_degrades_to_misses() -> TestResult {
    let clock = Clock::new_frozen();
    let (cache, mock) = mock_cache(&clock);
    mock.fail_when(|op| !matches!(op, AdapterOp::Clear | AdapterOp::Close));

    block_on(async {
        assert!(!cache.set("k", &1, &CacheOptions::new()).await?);
        assert_eq!(cache.get::<i32>("k").await?, None);
        assert!(!cache.delete("k").await?);
        assert!(!cache.exists("k").await?);
        assert_eq!(cache.invalidate_by_tag("t").await, 0);
        assert_eq!(cache.mset(&[BatchEntry::new("m", json!(1))], &CacheOptions::new()).await?, 0);
        assert_eq!(cache.mget::<i32>(&["m"]).await?.missing, vec!["m".to_string()]);
        assert!(!cache.is_healthy().await);

        let value = cache
            .get_or_insert_with("k", || async { Ok::<_, std::io::Error>(Some(9)) }, &CacheOptions::new())
            .await?;
        assert_eq!(value, Some(9));
        Ok(())
    })
}

#[test]
fn clear_propagates_adapter_errors() {
    let clock = Clock::new_frozen();
    let (cache, mock) = mock_cache(&clock);

    block_on(async {
        cache.set("k", &1, &CacheOptions::new()).await.unwrap();
        mock.fail_when(|op| matches!(op, AdapterOp::Clear));

        let error = cache.clear().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Adapter);
        assert_eq!(cache.local_len(), 0);

        mock.clear_failures();
        cache.clear().await.unwrap();
        assert_eq!(mock.entry_count(), 0);
    });
}

#[test]
fn exists_checks_both_layers() -> TestResult {
    let clock = Clock::new_frozen();
    let (cache, mock) = mock_cache(&clock);

    block_on(async {
        cache.set("local", &1, &CacheOptions::new()).await?;
        mock.set("remote", &json!(2), &CacheOptions::new()).await.unwrap();

        assert!(cache.exists("local").await?);
        assert!(cache.exists("remote").await?);
        assert!(!cache.exists("neither").await?);
        Ok(())
    })
}

#[test]
fn adapter_hits_inherit_call_options() -> TestResult {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let mock = MockAdapter::new(&clock).with_default_ttl(Duration::from_secs(1_000));
    let cache = TieredCache::builder(clock).storage(mock.clone()).test_mode(true).build();

    block_on(async {
        mock.set("k", &json!(1), &CacheOptions::new()).await.unwrap();
        let options = CacheOptions::new().ttl(Duration::from_secs(5)).tag("promoted");
        assert_eq!(cache.get_with_options::<i32>("k", &options).await?, Some(1));

        // The local copy carries the promoted tag.
        mock.fail_when(|op| matches!(op, AdapterOp::InvalidateByTags(_)));
        assert_eq!(cache.invalidate_by_tag("promoted").await, 1);
        assert_eq!(cache.local_len(), 0);
        Ok(())
    })
}

#[test]
fn clones_share_both_layers() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        let clone = cache.clone();

        cache.set("k", &1, &CacheOptions::new()).await?;
        assert_eq!(clone.get::<i32>("k").await?, Some(1));
        assert_eq!(clone.local_len(), 1);
        Ok(())
    })
}

#[test]
fn sweep_removes_expired_local_entries() -> TestResult {
    let control = ClockControl::new();
    let cache = memory_cache(control.to_clock());

    block_on(async {
        cache.set("a", &1, &CacheOptions::new().ttl(Duration::from_secs(1)).tag("t")).await?;
        cache.set("b", &2, &CacheOptions::new().ttl(Duration::from_secs(60))).await?;
        Ok::<_, Error>(())
    })?;
    control.advance(Duration::from_secs(2));

    assert_eq!(cache.sweep_expired(), 1);
    assert_eq!(cache.local_len(), 1);
    Ok(())
}

#[test]
fn close_stops_the_adapter_once() {
    let clock = Clock::new_frozen();
    let (cache, mock) = mock_cache(&clock);

    block_on(async {
        assert!(cache.is_healthy().await);
        cache.close().await;
        cache.close().await;
        assert!(!cache.is_healthy().await);
    });

    assert_eq!(mock.operations().iter().filter(|op| **op == AdapterOp::Close).count(), 1);
}

#[test]
fn adapter_is_reachable_for_unwrapped_operations() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        assert_eq!(cache.adapter().increment("hits", 2).await.unwrap(), 2);
        assert_eq!(cache.adapter().decrement("hits", 1).await.unwrap(), 1);
        Ok(())
    })
}

#[test]
fn namespaced_tag_invalidation_reaches_both_layers() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        let tenant = CacheOptions::new().namespace("tenant").tag("users");
        let ada = User { name: "Ada".into() };

        cache.set("user:1", &ada, &tenant).await?;
        assert_eq!(cache.get_with_options::<User>("user:1", &tenant).await?, Some(ada));

        assert_eq!(cache.invalidate_by_tag("users").await, 2);
        assert_eq!(cache.local_len(), 0);
        assert_eq!(cache.get_with_options::<User>("user:1", &tenant).await?, None);
        Ok(())
    })
}

#[test]
fn namespaced_entries_are_deleted_where_they_were_written() -> TestResult {
    block_on(async {
        let cache = memory_cache(Clock::new_frozen());
        let tenant = CacheOptions::new().namespace("tenant");
        cache.set("session:1", &1, &tenant).await?;
        cache.set("session:2", &2, &tenant).await?;

        assert_eq!(cache.invalidate_by_pattern("session:1").await?, 1);
        assert_eq!(cache.get_with_options::<i32>("session:1", &tenant).await?, None);

        assert!(!cache.exists("session:2").await?);
        assert!(cache.exists_with_options("session:2", &tenant).await?);
        assert!(!cache.delete("session:2").await?);
        assert!(cache.delete_with_options("session:2", &tenant).await?);
        assert!(!cache.exists_with_options("session:2", &tenant).await?);
        assert_eq!(cache.get_with_options::<i32>("session:2", &tenant).await?, None);
        Ok(())
    })
}

#[test]
fn raw_and_json_values_mix_without_a_local_layer() -> TestResult {
    block_on(async {
        let cache = TieredCache::builder(Clock::new_frozen())
            .max_memory_entries(0)
            .test_mode(true)
            .build();
        let ada = User { name: "Ada".into() };

        assert!(cache.set("raw", "{not json", &CacheOptions::new().serialize(false)).await?);
        assert!(cache.set("json", &ada, &CacheOptions::new()).await?);

        assert_eq!(cache.get::<String>("raw").await?, Some("{not json".to_string()));
        let raw_reader = CacheOptions::new().serialize(false);
        assert_eq!(cache.get_with_options::<User>("json", &raw_reader).await?, Some(ada));

        let batch = cache.mget::<serde_json::Value>(&["raw", "json", "none"]).await?;
        assert_eq!(batch.found["raw"], json!("{not json"));
        assert_eq!(batch.found["json"], json!({"name": "Ada"}));
        assert_eq!(batch.missing, vec!["none".to_string()]);
        let stats = cache.stats().await;
        assert_eq!((stats.l2.errors, stats.l2.adapter.errors), (0, 0));
        Ok(())
    })
}

#[test]
fn promoted_entries_follow_tag_invalidation() -> TestResult {
    block_on(async {
        let cache = TieredCache::builder(Clock::new_frozen())
            .max_memory_entries(1)
            .test_mode(true)
            .build();

        cache.set("a", &1, &CacheOptions::new().tag("group")).await?;
        cache.set("b", &2, &CacheOptions::new()).await?;
        assert_eq!(cache.get::<i32>("a").await?, Some(1));

        assert_eq!(cache.invalidate_by_tag("group").await, 2);
        assert_eq!(cache.get::<i32>("a").await?, None);

        cache.set("c", &3, &CacheOptions::new().tag("group")).await?;
        cache.set("d", &4, &CacheOptions::new()).await?;
        assert_eq!(cache.mget::<i32>(&["c"]).await?.found["c"], 3);
        assert_eq!(cache.invalidate_by_tag("group").await, 2);
        assert_eq!(cache.get::<i32>("c").await?, None);
        Ok(())
    })
}

#[test]
fn warmup_runs_queries_concurrently() {
    let cache = memory_cache(Clock::new_frozen());
    let finished = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let slow_log = Arc::clone(&finished);
    let slow = WarmupQuery::new("slow", move || {
        let log = Arc::clone(&slow_log);
        async move {
            let mut yielded = false;
            futures::future::poll_fn(|cx| {
                if yielded {
                    std::task::Poll::Ready(())
                } else {
                    yielded = true;
                    cx.waker().wake_by_ref();
                    std::task::Poll::Pending
                }
            })
            .await;
            log.lock().push("slow");
            Ok::<_, std::io::Error>(Some(1))
        }
    });
    let fast_log = Arc::clone(&finished);
    let fast = WarmupQuery::new("fast", move || {
        let log = Arc::clone(&fast_log);
        async move {
            log.lock().push("fast");
            Ok::<_, std::io::Error>(Some(2))
        }
    });

    let summary = block_on(cache.warmup(&[slow, fast]));

    assert_eq!(summary.loaded, 2);
    assert_eq!(*finished.lock(), vec!["fast", "slow"]);
}
