//! In-memory record store.

use crate::error::{StoreError, StoreResult};
use crate::policy::{GenerationPolicy, MapWriteMode, ReadPolicy, RecordExistsAction, WritePolicy};
use crate::record::{Record, RecordKey, SubKey, Value};
use crate::store::RecordStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// An in-process record store.
///
/// This store keeps every record in memory and applies each mutation
/// under a single write lock, so generation checks are exact. It is
/// suitable for:
/// - Unit and integration tests
/// - The command-line load harness
///
/// # Example
///
/// ```rust
/// use adaptmap_store::{InMemoryStore, RecordKey, RecordStore, Value, WritePolicy};
///
/// let store = InMemoryStore::new();
/// let key = RecordKey::text("test", "demo", "k");
/// store.put_record(&key, vec![("n".into(), Value::Int(1))], &WritePolicy::default()).unwrap();
///
/// // A stale generation is rejected.
/// let stale = WritePolicy::new().expect_generation(0);
/// assert!(store.put_record(&key, vec![("n".into(), Value::Int(2))], &stale).is_err());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<RecordKey, Record>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns the keys of every record in `namespace`/`set`, sorted.
    #[must_use]
    pub fn keys_in(&self, namespace: &str, set: &str) -> Vec<RecordKey> {
        let mut keys: Vec<_> = self
            .records
            .read()
            .keys()
            .filter(|key| key.in_set(namespace, set))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

fn check_generation(key: &RecordKey, stored: Option<&Record>, policy: &WritePolicy) -> StoreResult<()> {
    if let GenerationPolicy::ExpectEqual(expected) = policy.generation {
        let actual = stored.map_or(0, |record| record.generation);
        if actual != expected {
            return Err(StoreError::GenerationMismatch {
                key: key.clone(),
                expected,
                actual,
            });
        }
    }
    Ok(())
}

impl RecordStore for InMemoryStore {
    fn get(&self, key: &RecordKey, _policy: &ReadPolicy) -> StoreResult<Option<Record>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn put_map_entry(
        &self,
        key: &RecordKey,
        bin: &str,
        sub_key: SubKey,
        value: Value,
        policy: &WritePolicy,
    ) -> StoreResult<u32> {
        let mut records = self.records.write();
        check_generation(key, records.get(key), policy)?;

        let record = records.entry(key.clone()).or_default();
        let slot = record
            .bins
            .entry(bin.to_owned())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        let Value::Map(map) = slot else {
            return Err(StoreError::BinTypeMismatch {
                key: key.clone(),
                bin: bin.to_owned(),
                expected: "map",
            });
        };

        let exists = map.contains_key(&sub_key);
        let rejected = match policy.map.write_mode {
            MapWriteMode::Upsert => None,
            MapWriteMode::CreateOnly if exists => Some(StoreError::EntryExists {
                key: key.clone(),
                sub_key,
            }),
            MapWriteMode::UpdateOnly if !exists => Some(StoreError::EntryNotFound {
                key: key.clone(),
                sub_key,
            }),
            _ => None,
        };
        if let Some(err) = rejected {
            // Never leave behind a record created only for a rejected write
            if record.generation == 0 {
                records.remove(key);
            }
            return Err(err);
        }

        map.insert(sub_key, value);
        record.generation += 1;
        Ok(record.generation)
    }

    fn put_record(
        &self,
        key: &RecordKey,
        bins: Vec<(String, Value)>,
        policy: &WritePolicy,
    ) -> StoreResult<u32> {
        let mut records = self.records.write();
        let stored = records.get(key);
        if policy.exists == RecordExistsAction::CreateOnly && stored.is_some() {
            return Err(StoreError::RecordExists { key: key.clone() });
        }
        check_generation(key, stored, policy)?;

        let record = records.entry(key.clone()).or_default();
        for (name, value) in bins {
            if value.is_null() {
                record.bins.remove(&name);
            } else {
                record.bins.insert(name, value);
            }
        }
        record.generation += 1;
        Ok(record.generation)
    }

    fn delete(&self, key: &RecordKey, policy: &WritePolicy) -> StoreResult<bool> {
        let mut records = self.records.write();
        check_generation(key, records.get(key), policy)?;
        Ok(records.remove(key).is_some())
    }

    fn increment(
        &self,
        key: &RecordKey,
        bin: &str,
        delta: i64,
        policy: &WritePolicy,
    ) -> StoreResult<i64> {
        let mut records = self.records.write();
        check_generation(key, records.get(key), policy)?;

        let record = records.entry(key.clone()).or_default();
        let current = match record.bins.get(bin) {
            None => 0,
            Some(Value::Int(v)) => *v,
            Some(_) => {
                return Err(StoreError::BinTypeMismatch {
                    key: key.clone(),
                    bin: bin.to_owned(),
                    expected: "integer",
                })
            }
        };
        let next = current.wrapping_add(delta);
        record.bins.insert(bin.to_owned(), Value::Int(next));
        record.generation += 1;
        Ok(next)
    }

    fn batch_get(
        &self,
        keys: &[RecordKey],
        _policy: &ReadPolicy,
    ) -> Vec<StoreResult<Option<Record>>> {
        let records = self.records.read();
        keys.iter().map(|key| Ok(records.get(key).cloned())).collect()
    }

    fn truncate(&self, namespace: &str, set: &str) -> StoreResult<()> {
        self.records
            .write()
            .retain(|key, _| !key.in_set(namespace, set));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MapPolicy;

    fn key(id: &str) -> RecordKey {
        RecordKey::text("test", "maps", id)
    }

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert!(store.get(&key("a"), &ReadPolicy::default()).unwrap().is_none());
    }

    #[test]
    fn map_entry_creates_record_at_generation_one() {
        let store = InMemoryStore::new();
        let generation = store
            .put_map_entry(&key("a"), "m", 5, Value::Int(50), &WritePolicy::default())
            .unwrap();
        assert_eq!(generation, 1);

        let generation = store
            .put_map_entry(&key("a"), "m", 3, Value::Int(30), &WritePolicy::default())
            .unwrap();
        assert_eq!(generation, 2);

        let record = store.get(&key("a"), &ReadPolicy::default()).unwrap().unwrap();
        let keys: Vec<_> = record.map("m").unwrap().keys().copied().collect();
        assert_eq!(keys, vec![3, 5]);
    }

    #[test]
    fn generation_mismatch_rejects_write() {
        let store = InMemoryStore::new();
        store
            .put_map_entry(&key("a"), "m", 1, Value::Int(1), &WritePolicy::default())
            .unwrap();

        let stale = WritePolicy::new().expect_generation(0);
        let result = store.put_map_entry(&key("a"), "m", 2, Value::Int(2), &stale);
        assert!(matches!(
            result,
            Err(StoreError::GenerationMismatch {
                expected: 0,
                actual: 1,
                ..
            })
        ));

        let record = store.get(&key("a"), &ReadPolicy::default()).unwrap().unwrap();
        assert_eq!(record.generation, 1);
        assert_eq!(record.map("m").unwrap().len(), 1);
    }

    #[test]
    fn expect_zero_generation_means_absent() {
        let store = InMemoryStore::new();
        let policy = WritePolicy::new().expect_generation(0);
        assert_eq!(
            store
                .put_record(&key("a"), vec![("x".into(), Value::Int(1))], &policy)
                .unwrap(),
            1
        );
        assert!(store
            .put_record(&key("a"), vec![("x".into(), Value::Int(2))], &policy)
            .is_err());
    }

    #[test]
    fn map_write_modes() {
        let store = InMemoryStore::new();
        let create = WritePolicy::new().with_map_policy(MapPolicy::new(MapWriteMode::CreateOnly));
        let update = WritePolicy::new().with_map_policy(MapPolicy::new(MapWriteMode::UpdateOnly));

        let missing = store.put_map_entry(&key("a"), "m", 1, Value::Int(1), &update);
        assert!(matches!(missing, Err(StoreError::EntryNotFound { sub_key: 1, .. })));
        // The rejected write must not have created the record
        assert!(store.is_empty());

        store
            .put_map_entry(&key("a"), "m", 1, Value::Int(1), &create)
            .unwrap();
        let dup = store.put_map_entry(&key("a"), "m", 1, Value::Int(9), &create);
        assert!(matches!(dup, Err(StoreError::EntryExists { sub_key: 1, .. })));

        store
            .put_map_entry(&key("a"), "m", 1, Value::Int(2), &update)
            .unwrap();
        let record = store.get(&key("a"), &ReadPolicy::default()).unwrap().unwrap();
        assert_eq!(record.map("m").unwrap().get(&1), Some(&Value::Int(2)));
    }

    #[test]
    fn put_map_entry_on_scalar_bin_fails() {
        let store = InMemoryStore::new();
        store
            .put_record(&key("a"), vec![("m".into(), Value::Int(1))], &WritePolicy::default())
            .unwrap();
        let result = store.put_map_entry(&key("a"), "m", 1, Value::Int(1), &WritePolicy::default());
        assert!(matches!(result, Err(StoreError::BinTypeMismatch { .. })));
    }

    #[test]
    fn put_record_create_only_and_null_removal() {
        let store = InMemoryStore::new();
        let create = WritePolicy::new().create_only();
        store
            .put_record(
                &key("a"),
                vec![("x".into(), Value::Int(1)), ("y".into(), Value::Int(2))],
                &create,
            )
            .unwrap();
        assert!(matches!(
            store.put_record(&key("a"), vec![], &create),
            Err(StoreError::RecordExists { .. })
        ));

        store
            .put_record(&key("a"), vec![("y".into(), Value::Null)], &WritePolicy::default())
            .unwrap();
        let record = store.get(&key("a"), &ReadPolicy::default()).unwrap().unwrap();
        assert_eq!(record.int("x"), Some(1));
        assert!(record.bin("y").is_none());
        assert_eq!(record.generation, 2);
    }

    #[test]
    fn increment_is_atomic_counter() {
        let store = InMemoryStore::new();
        let policy = WritePolicy::default();
        assert_eq!(store.increment(&key("c"), "seq", 1, &policy).unwrap(), 1);
        assert_eq!(store.increment(&key("c"), "seq", 1, &policy).unwrap(), 2);
        assert_eq!(store.increment(&key("c"), "seq", 5, &policy).unwrap(), 7);
    }

    #[test]
    fn concurrent_increments_are_unique() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..100)
                        .map(|_| {
                            store
                                .increment(&key("c"), "seq", 1, &WritePolicy::default())
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn batch_get_preserves_order() {
        let store = InMemoryStore::new();
        store
            .put_map_entry(&key("b"), "m", 1, Value::Int(1), &WritePolicy::default())
            .unwrap();
        let results = store.batch_get(&[key("a"), key("b"), key("c")], &ReadPolicy::default());
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().is_none());
        assert!(results[1].as_ref().unwrap().is_some());
        assert!(results[2].as_ref().unwrap().is_none());
    }

    #[test]
    fn delete_with_generation() {
        let store = InMemoryStore::new();
        store
            .put_map_entry(&key("a"), "m", 1, Value::Int(1), &WritePolicy::default())
            .unwrap();
        assert!(store
            .delete(&key("a"), &WritePolicy::new().expect_generation(9))
            .is_err());
        assert!(store
            .delete(&key("a"), &WritePolicy::new().expect_generation(1))
            .unwrap());
        assert!(!store.delete(&key("a"), &WritePolicy::default()).unwrap());
    }

    #[test]
    fn truncate_only_touches_one_set() {
        let store = InMemoryStore::new();
        let policy = WritePolicy::default();
        store.put_map_entry(&key("a"), "m", 1, Value::Int(1), &policy).unwrap();
        let other = RecordKey::text("test", "other", "a");
        store.put_map_entry(&other, "m", 1, Value::Int(1), &policy).unwrap();

        store.truncate("test", "maps").unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.keys_in("test", "maps").is_empty());
        assert_eq!(store.keys_in("test", "other"), vec![other]);
    }
}
