// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Value encoding shared by durable adapters.
//!
//! Values are serialized as JSON unless serialization is turned off, in which case
//! only strings are accepted and stored verbatim behind [`RAW_MARKER`]. Encoded
//! payloads at or above the compression threshold are zstd-compressed and prefixed
//! with [`COMPRESSION_MARKER`], so a reader never needs to know how a payload was written.

use serde_json::Value;

use crate::{CacheOptions, Error, Result};

/// Prefix identifying a compressed payload. JSON text can never start with a NUL byte.
pub const COMPRESSION_MARKER: &[u8] = b"\0zstd\0";

/// Prefix identifying a raw string written with serialization off.
pub const RAW_MARKER: &[u8] = b"\0raw\0";

/// Payload size, in bytes, from which compression kicks in.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

const COMPRESSION_LEVEL: i32 = 3;

/// Encodes values into payloads and back.
///
/// # Examples
///
/// ```
/// use layercache_adapter::Codec;
/// use serde_json::json;
///
/// let codec = Codec::new().with_threshold(16);
/// let value = json!({"name": "Ada", "bio": "x".repeat(100)});
///
/// let payload = codec.encode(&value)?;
/// assert!(Codec::is_compressed(&payload));
/// assert_eq!(codec.decode(&payload)?, value);
/// # Ok::<(), layercache_adapter::Error>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Codec {
    serialize: bool,
    compress: bool,
    threshold: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// Creates a codec with serialization and compression enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            serialize: true,
            compress: true,
            threshold: DEFAULT_COMPRESSION_THRESHOLD,
        }
    }

    /// Turns JSON serialization on or off.
    #[must_use]
    pub fn with_serialization(mut self, serialize: bool) -> Self {
        self.serialize = serialize;
        self
    }

    /// Turns compression on or off.
    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Sets the payload size from which compression applies.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Applies the per-call overrides in `options`.
    #[must_use]
    pub fn for_call(self, options: &CacheOptions) -> Self {
        Self {
            serialize: options.serialize.unwrap_or(self.serialize),
            compress: options.compress.unwrap_or(self.compress),
            threshold: self.threshold,
        }
    }

    /// Returns `true` if `payload` carries the compression marker.
    #[must_use]
    pub fn is_compressed(payload: &[u8]) -> bool {
        payload.starts_with(COMPRESSION_MARKER)
    }

    /// Encodes `value` into a payload.
    ///
    /// # Errors
    ///
    /// Fails when serialization is off and `value` is not a string, or when the
    /// value cannot be serialized or compressed.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let raw = if self.serialize {
            serde_json::to_vec(value)?
        } else {
            match value {
                Value::String(s) => [RAW_MARKER, s.as_bytes()].concat(),
                _ => return Err(Error::from_message("serialization is disabled and the value is not a string")),
            }
        };

        if !self.compress || raw.len() < self.threshold {
            return Ok(raw);
        }

        let compressed = zstd::encode_all(raw.as_slice(), COMPRESSION_LEVEL)?;
        let mut payload = Vec::with_capacity(COMPRESSION_MARKER.len() + compressed.len());
        payload.extend_from_slice(COMPRESSION_MARKER);
        payload.extend_from_slice(&compressed);
        Ok(payload)
    }

    /// Decodes a payload produced by [`encode`](Self::encode), whatever settings
    /// the writer used.
    ///
    /// # Errors
    ///
    /// Fails on corrupt compressed data, invalid JSON or a raw payload that is not UTF-8.
    pub fn decode(&self, payload: &[u8]) -> Result<Value> {
        let inflated;
        let raw = if let Some(compressed) = payload.strip_prefix(COMPRESSION_MARKER) {
            inflated = zstd::decode_all(compressed)?;
            inflated.as_slice()
        } else {
            payload
        };

        match raw.strip_prefix(RAW_MARKER) {
            Some(text) => {
                let text = std::str::from_utf8(text).map_err(Error::caused_by)?;
                Ok(Value::String(text.to_owned()))
            }
            None => Ok(serde_json::from_slice(raw)?),
        }
    }
}
