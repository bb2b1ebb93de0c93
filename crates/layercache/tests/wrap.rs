// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for memoized functions and cache-aside handles.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use layercache::{CacheOptions, Error, ErrorKind, TieredCache, WrapOptions};
use tick::{Clock, ClockControl};

type TestResult = Result<(), Error>;

fn block_on<F: Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn cache(clock: Clock) -> TieredCache {
    TieredCache::builder(clock).test_mode(true).build()
}

#[test]
fn tuple_arguments_key_on_every_field() -> TestResult {
    let cache = cache(Clock::new_frozen());
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    let add = cache.wrap(
        "add",
        move |(a, b): (i64, i64)| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, io::Error>(a + b) }
        },
        WrapOptions::new(),
    );

    block_on(async {
        assert_eq!(add.call((1, 2)).await?, 3);
        assert_eq!(add.call((2, 1)).await?, 3);
        assert_eq!(add.call((1, 2)).await?, 3);
        Ok::<_, Error>(())
    })?;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(add.key_for(&(1, 2))?, "add:[1,2]");
    assert_eq!(add.name(), "add");
    Ok(())
}

#[test]
fn failures_are_not_memoized() {
    let cache = cache(Clock::new_frozen());
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    let flaky = cache.wrap(
        "flaky",
        move |id: u32| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(io::Error::other("backend unavailable"))
                } else {
                    Ok(format!("user-{id}"))
                }
            }
        },
        WrapOptions::new(),
    );

    block_on(async {
        let error = flaky.call(7).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Producer);
        assert_eq!(flaky.call(7).await.unwrap(), "user-7");
        assert_eq!(flaky.call(7).await.unwrap(), "user-7");
    });

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn key_generator_and_ttl_are_honored() -> TestResult {
    let control = ClockControl::new();
    let cache = cache(control.to_clock());
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    let lookup = cache.wrap(
        "lookup",
        move |id: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, io::Error>(id * 10) }
        },
        WrapOptions::new()
            .key_generator(|id: &u32| format!("item:{id}"))
            .ttl(Duration::from_secs(5)),
    );

    block_on(async {
        assert_eq!(lookup.call(3).await?, 30);
        assert_eq!(cache.get::<u32>("item:3").await?, Some(30));

        control.advance(Duration::from_secs(5));
        assert_eq!(cache.get::<u32>("item:3").await?, None);
        assert_eq!(lookup.call(3).await?, 30);
        Ok::<_, Error>(())
    })?;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn cache_aside_handles_share_their_key() -> TestResult {
    let cache = cache(Clock::new_frozen());
    let fetches = AtomicUsize::new(0);
    let counter = &fetches;

    let reader = cache.cache_aside(
        "config",
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, io::Error>(Some("fetched".to_string())) }
        },
        CacheOptions::new(),
    );
    let writer = cache.cache_aside(
        "config",
        || async { Ok::<Option<String>, io::Error>(None) },
        CacheOptions::new(),
    );

    block_on(async {
        writer.set(&"written".to_string()).await?;
        assert_eq!(reader.get().await?.as_deref(), Some("written"));

        assert!(writer.delete().await?);
        assert_eq!(reader.get().await?.as_deref(), Some("fetched"));
        assert_eq!(writer.get().await?.as_deref(), Some("fetched"));
        Ok::<_, Error>(())
    })?;

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(reader.key(), writer.key());
    Ok(())
}

#[test]
fn cache_aside_fetch_returning_none_stores_nothing() -> TestResult {
    let cache = cache(Clock::new_frozen());
    let absent = cache.cache_aside(
        "absent",
        || async { Ok::<Option<u8>, io::Error>(None) },
        CacheOptions::new(),
    );

    block_on(async {
        assert_eq!(absent.get().await?, None);
        assert!(!cache.exists("absent").await?);
        Ok(())
    })
}
