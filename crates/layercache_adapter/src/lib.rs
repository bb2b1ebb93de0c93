// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Storage adapter contract for the layercache multi-layer cache.
//!
//! This crate defines the [`StorageAdapter`] trait that every durable backend
//! must satisfy, together with the types that cross that boundary: per-call
//! [`CacheOptions`], batch results, [`HealthStatus`], [`AdapterStats`] and the
//! [`Error`] type for fallible operations.
//!
//! # Overview
//!
//! The orchestrator in `layercache` keeps a bounded in-process layer in front of
//! exactly one adapter. Adapters own expiry, tagging, namespacing and the byte
//! encoding of values; the orchestrator only sees [`serde_json::Value`]s.
//!
//! Shared building blocks for adapter authors live here as well:
//!
//! - [`Codec`] turns values into bytes, optionally compressing large payloads.
//! - [`StoredRecord`] is the record shape adapters persist.
//! - [`keys`] has the namespacing and glob-matching helpers.
//! - [`StatsRecorder`] keeps lock-free counters behind [`StorageAdapter::stats`].
//!
//! # Dynamic Dispatch
//!
//! Enable the `dynamic-adapter` feature (on by default) for [`DynamicAdapter`], which
//! wraps any `StorageAdapter` in a clonable, type-erased container. The orchestrator
//! selects its backend at construction time through it.
//!
//! # Testing
//!
//! The `test-util` feature exposes [`testing::MockAdapter`], which records every
//! operation and can be told to fail any of them.

mod adapter;
mod codec;
pub mod error;
pub mod keys;
mod options;
mod record;
mod stats;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[cfg(any(test, feature = "dynamic-adapter"))]
mod dynamic;

#[doc(inline)]
pub use adapter::{AdapterKind, StorageAdapter};
#[doc(inline)]
pub use codec::{COMPRESSION_MARKER, Codec, DEFAULT_COMPRESSION_THRESHOLD, RAW_MARKER};
#[cfg(any(test, feature = "dynamic-adapter"))]
#[doc(inline)]
pub use dynamic::{DynamicAdapter, DynamicAdapterExt};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use options::CacheOptions;
#[doc(inline)]
pub use record::{AdapterEntry, BatchEntry, BatchGet, HealthStatus, StoredRecord};
#[doc(inline)]
pub use stats::{AdapterStats, StatsRecorder, ratio};
