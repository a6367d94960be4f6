//! Error types for store operations.

use crate::record::RecordKey;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record's generation did not match the expected generation.
    #[error("generation mismatch on {key}: expected {expected}, found {actual}")]
    GenerationMismatch {
        /// The record that was written.
        key: RecordKey,
        /// Generation the writer expected.
        expected: u32,
        /// Generation currently stored (0 if the record does not exist).
        actual: u32,
    },

    /// A create-only write found an existing record.
    #[error("record already exists: {key}")]
    RecordExists {
        /// The record that already exists.
        key: RecordKey,
    },

    /// A create-only map write found an existing entry.
    #[error("map entry {sub_key} already exists in {key}")]
    EntryExists {
        /// The record holding the map.
        key: RecordKey,
        /// The existing map key.
        sub_key: i64,
    },

    /// An update-only map write found no entry.
    #[error("map entry {sub_key} not found in {key}")]
    EntryNotFound {
        /// The record holding the map.
        key: RecordKey,
        /// The missing map key.
        sub_key: i64,
    },

    /// A bin held a value of the wrong type for the operation.
    #[error("bin '{bin}' in {key} is not a {expected}")]
    BinTypeMismatch {
        /// The record holding the bin.
        key: RecordKey,
        /// The bin name.
        bin: String,
        /// The type the operation required.
        expected: &'static str,
    },

    /// The call exceeded its timeout.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Returns true if the write lost an optimistic-concurrency race and
    /// may succeed when retried against freshly read state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::GenerationMismatch { .. } | StoreError::RecordExists { .. }
        )
    }

    /// Returns true for transport-level failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}
