// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Errors surfaced by the orchestrator.

use std::fmt;

/// Boxed error returned by producers and fetchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classifies an [`Error`].
///
/// Only caller mistakes and producer failures reach the caller of a read or write.
/// Storage adapter failures are absorbed into misses, with [`clear`](crate::TieredCache::clear)
/// as the single exception.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The key is empty, longer than 250 characters, or contains a line break.
    InvalidKey,
    /// The value cannot be turned into a cacheable representation.
    InvalidValue,
    /// An invalidation pattern is not a valid regular expression.
    InvalidPattern,
    /// A fallback producer failed; the producer's error is the source.
    Producer,
    /// The storage adapter failed an administrative operation.
    Adapter,
}

impl ErrorKind {
    /// Returns a short, stable description of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidKey => "invalid key",
            Self::InvalidValue => "invalid value",
            Self::InvalidPattern => "invalid pattern",
            Self::Producer => "producer failed",
            Self::Adapter => "storage adapter failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a cache operation.
///
/// Use [`kind`](Self::kind) to tell caller mistakes from producer failures, and
/// [`std::error::Error::source()`] to reach the underlying cause.
///
/// # Examples
///
/// ```
/// use layercache::{Error, ErrorKind};
///
/// fn is_caller_mistake(error: &Error) -> bool {
///     matches!(
///         error.kind(),
///         ErrorKind::InvalidKey | ErrorKind::InvalidValue | ErrorKind::InvalidPattern
///     )
/// }
/// ```
#[ohno::error]
#[display("cache operation failed: {kind}")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns what went wrong.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub(crate) fn invalid_key(key: &str, reason: &'static str) -> Self {
        Self::caused_by(ErrorKind::InvalidKey, format!("key {key:?} {reason}"))
    }
}

/// A specialized `Result` type for cache operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Longest key accepted, in characters.
pub const MAX_KEY_LENGTH: usize = 250;

/// Rejects keys the adapters cannot store.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_key(key, "is empty"));
    }
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(Error::caused_by(
            ErrorKind::InvalidKey,
            format!("key is longer than {MAX_KEY_LENGTH} characters"),
        ));
    }
    if key.contains(['\n', '\r']) {
        return Err(Error::invalid_key(key, "contains a line break"));
    }
    Ok(())
}
