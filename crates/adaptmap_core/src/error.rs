//! Error types for AdaptMap core.

use adaptmap_store::{StoreError, SubKey};
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in AdaptMap operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The base key has never been written.
    #[error("map not found: {base_key}")]
    MapNotFound {
        /// The base key that was looked up.
        base_key: String,
    },

    /// The base key exists but holds no entry for the sub-key.
    #[error("entry {sub_key} not found in map {base_key} (segment {segment})")]
    EntryNotFound {
        /// The base key that was looked up.
        base_key: String,
        /// The missing sub-key.
        sub_key: SubKey,
        /// Ordinal of the segment owning the sub-key.
        segment: u32,
    },

    /// A create-only put found an existing entry.
    #[error("entry {sub_key} already exists in map {base_key}")]
    EntryExists {
        /// The base key written.
        base_key: String,
        /// The existing sub-key.
        sub_key: SubKey,
    },

    /// Optimistic-concurrency races exceeded the retry budget.
    #[error("conflict retries exhausted for map {base_key} after {attempts} attempts")]
    ConflictRetryExhausted {
        /// The contended base key.
        base_key: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The operation exceeded its deadline.
    #[error("operation on map {base_key} timed out after {elapsed:?} (segment {segment:?})")]
    Timeout {
        /// The base key being operated on.
        base_key: String,
        /// Ordinal of the segment being accessed, if any.
        segment: Option<u32>,
        /// Time spent before giving up.
        elapsed: Duration,
        /// The store call that timed out, if the budget ran out inside one.
        #[source]
        source: Option<StoreError>,
    },

    /// Malformed base key, sub-key, value or configuration.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The store could not be reached.
    #[error("store unavailable for map {base_key} (segment {segment:?}): {source}")]
    StoreUnavailable {
        /// The base key being operated on.
        base_key: String,
        /// Ordinal of the segment being accessed, if any.
        segment: Option<u32>,
        /// The underlying transport failure.
        #[source]
        source: StoreError,
    },

    /// A segment record does not have the expected shape.
    #[error("corrupted segment {segment} of map {base_key}: {message}")]
    Corrupted {
        /// The base key.
        base_key: String,
        /// Ordinal of the bad segment.
        segment: u32,
        /// Description of the problem.
        message: String,
    },

    /// Any other store error raised while operating on a map.
    #[error("store error on map {base_key} (segment {segment:?}): {source}")]
    StoreFailure {
        /// The base key being operated on.
        base_key: String,
        /// Ordinal of the segment being accessed, if any.
        segment: Option<u32>,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// A store error outside any map, such as a failed truncate.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Creates a map not found error.
    pub fn map_not_found(base_key: impl Into<String>) -> Self {
        Self::MapNotFound {
            base_key: base_key.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a corrupted segment error.
    pub fn corrupted(base_key: impl Into<String>, segment: u32, message: impl Into<String>) -> Self {
        Self::Corrupted {
            base_key: base_key.into(),
            segment,
            message: message.into(),
        }
    }

    /// Returns true for either flavour of not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MapNotFound { .. } | Self::EntryNotFound { .. })
    }

    /// Maps a store failure into the core taxonomy, attaching context.
    pub(crate) fn from_store(
        base_key: &str,
        segment: Option<u32>,
        sub_key: SubKey,
        elapsed: Duration,
        err: StoreError,
    ) -> Self {
        match err {
            StoreError::Timeout(_) => Self::Timeout {
                base_key: base_key.to_owned(),
                segment,
                elapsed,
                source: Some(err),
            },
            StoreError::Unavailable(_) | StoreError::Io(_) => Self::StoreUnavailable {
                base_key: base_key.to_owned(),
                segment,
                source: err,
            },
            StoreError::EntryExists { .. } => Self::EntryExists {
                base_key: base_key.to_owned(),
                sub_key,
            },
            StoreError::EntryNotFound { .. } => Self::EntryNotFound {
                base_key: base_key.to_owned(),
                sub_key,
                segment: segment.unwrap_or(0),
            },
            other => Self::StoreFailure {
                base_key: base_key.to_owned(),
                segment,
                source: other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_flavours_are_distinct() {
        let map = CoreError::map_not_found("12345:1583001000000");
        let entry = CoreError::EntryNotFound {
            base_key: "12345:1583001000000".into(),
            sub_key: 42,
            segment: 3,
        };
        assert!(map.is_not_found());
        assert!(entry.is_not_found());
        assert!(matches!(map, CoreError::MapNotFound { .. }));
        assert!(entry.to_string().contains("segment 3"));
    }

    #[test]
    fn store_errors_are_classified() {
        let elapsed = Duration::from_millis(10);
        let err = CoreError::from_store("a", Some(2), 1, elapsed, StoreError::Timeout(elapsed));
        assert!(matches!(
            err,
            CoreError::Timeout { segment: Some(2), source: Some(StoreError::Timeout(_)), .. }
        ));
        assert!(std::error::Error::source(&err).is_some());

        let err = CoreError::from_store(
            "a",
            Some(2),
            1,
            elapsed,
            StoreError::Unavailable("reset".into()),
        );
        assert!(matches!(err, CoreError::StoreUnavailable { segment: Some(2), .. }));
        assert!(err.to_string().contains("reset"));

        let err = CoreError::from_store("a", None, 1, elapsed, StoreError::Io(std::io::Error::other("x")));
        assert!(matches!(err, CoreError::StoreUnavailable { segment: None, .. }));

        let err = CoreError::from_store(
            "12345:1583001000000",
            Some(4),
            1,
            elapsed,
            StoreError::BinTypeMismatch {
                key: adaptmap_store::RecordKey::text("test", "testAdapt", "12345:1583001000000:4"),
                bin: "mapBin".into(),
                expected: "map",
            },
        );
        assert!(matches!(err, CoreError::StoreFailure { segment: Some(4), .. }));
        assert!(err.to_string().contains("12345:1583001000000"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
