// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for storage adapter operations.

/// An error from a storage adapter operation.
///
/// This is an opaque error type that can wrap any underlying error from an adapter
/// implementation: a lost connection, a timed out command, a payload that failed to
/// decode. Use [`std::error::Error::source()`] to access the underlying cause if needed.
///
/// The orchestrator never lets these escape its read/write paths; they are turned into
/// misses and counted.
///
/// # Example
///
/// ```
/// use layercache_adapter::Error;
///
/// let error = Error::from_message("connection refused");
/// ```
#[ohno::error]
pub struct Error {}

impl Error {
    /// Creates a new error from any type that can be converted to an error.
    ///
    /// This is the public API for creating adapter errors from external crates.
    ///
    /// # Examples
    ///
    /// ```
    /// use layercache_adapter::Error;
    ///
    /// let error = Error::from_message("command timed out");
    /// ```
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::caused_by(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::caused_by(error)
    }
}

/// A specialized [`Result`] type for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_cause_message() {
        let error = Error::caused_by("display test");
        let display_str = format!("{error}");
        assert!(
            display_str.contains("display test"),
            "display output should contain the cause message, got: {display_str}"
        );
    }

    #[test]
    fn json_errors_convert_with_their_message() {
        let json_error = serde_json::from_str::<u32>("not a number").expect_err("must fail to parse");
        let error = Error::from(json_error);
        assert!(format!("{error}").contains("expected"));
    }

    #[test]
    fn result_type_alias_propagates_errors() {
        fn returns_err() -> Result<i32> {
            Err(Error::from_message("expected failure"))
        }

        let err = returns_err().expect_err("should return an error");
        assert!(format!("{err}").contains("expected failure"));
    }
}
