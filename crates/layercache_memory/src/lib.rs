// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-process storage adapter backed by moka.
//!
//! This crate provides [`MemoryAdapter`], the reference implementation of
//! [`StorageAdapter`](layercache_adapter::StorageAdapter). It is the durable layer
//! used when no external backend is configured, and the one test suites run against.
//! Use [`MemoryAdapterBuilder`] to configure capacity, namespace, TTL and encoding
//! without exposing moka types directly.
//!
//! # Quick Start
//!
//! ```
//! use layercache_adapter::{CacheOptions, StorageAdapter};
//! use layercache_memory::MemoryAdapter;
//! use serde_json::json;
//! use std::time::Duration;
//! use tick::ClockControl;
//!
//! # futures::executor::block_on(async {
//! let clock = ClockControl::new().to_clock();
//! let adapter = MemoryAdapter::builder(&clock).max_capacity(1000).build();
//!
//! let options = CacheOptions::new().ttl(Duration::from_secs(60)).tag("users");
//! adapter.set("user:1", &json!({"name": "Ada"}), &options).await?;
//!
//! let value = adapter.get("user:1", &CacheOptions::new()).await?;
//! assert_eq!(value, Some(json!({"name": "Ada"})));
//! # Ok::<(), layercache_adapter::Error>(())
//! # }).unwrap();
//! ```
//!
//! # Features
//!
//! - **Expiry**: records expire against the injected clock and are dropped on read
//! - **Tags**: records can be invalidated in bulk by tag
//! - **Namespaces**: keys are stored as `namespace:key`
//! - **Compression**: payloads above a threshold are stored zstd-compressed

mod adapter;
pub mod builder;

#[doc(inline)]
pub use adapter::MemoryAdapter;
#[doc(inline)]
pub use builder::{DEFAULT_NAMESPACE, DEFAULT_TTL, MemoryAdapterBuilder};
