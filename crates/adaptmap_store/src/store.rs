//! Record store trait definition.

use crate::error::StoreResult;
use crate::policy::{ReadPolicy, WritePolicy};
use crate::record::{Record, RecordKey, SubKey, Value};

/// A remote record store with optimistic concurrency.
///
/// Every record carries a generation that starts at 1 when the record is
/// created and increases by one on each successful mutation. Writes whose
/// [`WritePolicy`] carries [`crate::GenerationPolicy::ExpectEqual`] succeed
/// only if the stored generation still matches.
///
/// # Invariants
///
/// - A successful mutation returns the record's new generation
/// - A failed mutation leaves the record unchanged
/// - `batch_get` preserves the order of its input keys
/// - Implementations must be `Send + Sync`; callers share one client
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For tests and local runs
/// - [`super::FaultInjectingStore`] - Failure-injecting wrapper
pub trait RecordStore: Send + Sync {
    /// Reads a record. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or transport failure.
    fn get(&self, key: &RecordKey, policy: &ReadPolicy) -> StoreResult<Option<Record>>;

    /// Writes one entry into a map bin, creating the record and the bin
    /// when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The generation condition fails
    /// - The map write mode rejects the entry
    /// - The bin exists but is not a map
    fn put_map_entry(
        &self,
        key: &RecordKey,
        bin: &str,
        sub_key: SubKey,
        value: Value,
        policy: &WritePolicy,
    ) -> StoreResult<u32>;

    /// Writes whole bins. A `Value::Null` removes the bin.
    ///
    /// # Errors
    ///
    /// Returns an error if the generation condition fails or the record
    /// exists under a create-only policy.
    fn put_record(
        &self,
        key: &RecordKey,
        bins: Vec<(String, Value)>,
        policy: &WritePolicy,
    ) -> StoreResult<u32>;

    /// Deletes a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the generation condition fails.
    fn delete(&self, key: &RecordKey, policy: &WritePolicy) -> StoreResult<bool>;

    /// Atomically adds `delta` to an integer bin and returns the new value.
    ///
    /// A missing record or bin counts as zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the bin exists but is not an integer.
    fn increment(
        &self,
        key: &RecordKey,
        bin: &str,
        delta: i64,
        policy: &WritePolicy,
    ) -> StoreResult<i64>;

    /// Reads many records in one round trip.
    ///
    /// The result has one outcome per input key, in input order.
    fn batch_get(
        &self,
        keys: &[RecordKey],
        policy: &ReadPolicy,
    ) -> Vec<StoreResult<Option<Record>>>;

    /// Removes every record in `namespace`/`set`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    fn truncate(&self, namespace: &str, set: &str) -> StoreResult<()>;
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn get(&self, key: &RecordKey, policy: &ReadPolicy) -> StoreResult<Option<Record>> {
        (**self).get(key, policy)
    }

    fn put_map_entry(
        &self,
        key: &RecordKey,
        bin: &str,
        sub_key: SubKey,
        value: Value,
        policy: &WritePolicy,
    ) -> StoreResult<u32> {
        (**self).put_map_entry(key, bin, sub_key, value, policy)
    }

    fn put_record(
        &self,
        key: &RecordKey,
        bins: Vec<(String, Value)>,
        policy: &WritePolicy,
    ) -> StoreResult<u32> {
        (**self).put_record(key, bins, policy)
    }

    fn delete(&self, key: &RecordKey, policy: &WritePolicy) -> StoreResult<bool> {
        (**self).delete(key, policy)
    }

    fn increment(
        &self,
        key: &RecordKey,
        bin: &str,
        delta: i64,
        policy: &WritePolicy,
    ) -> StoreResult<i64> {
        (**self).increment(key, bin, delta, policy)
    }

    fn batch_get(
        &self,
        keys: &[RecordKey],
        policy: &ReadPolicy,
    ) -> Vec<StoreResult<Option<Record>>> {
        (**self).batch_get(keys, policy)
    }

    fn truncate(&self, namespace: &str, set: &str) -> StoreResult<()> {
        (**self).truncate(namespace, set)
    }
}
