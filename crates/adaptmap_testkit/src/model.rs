//! Reference model for logical maps.
//!
//! Tracks what every map should contain so that an engine can be checked
//! against it after any sequence of operations.

use crate::generators::MapOperation;
use adaptmap_core::{AdaptiveMap, CoreError};
use adaptmap_store::{SubKey, Value};
use std::collections::{BTreeMap, HashMap};

/// Expected contents of every logical map.
#[derive(Debug, Default, Clone)]
pub struct ReferenceModel {
    maps: HashMap<String, BTreeMap<SubKey, Value>>,
}

impl ReferenceModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful put.
    pub fn put(&mut self, base_key: &str, sub_key: SubKey, value: Value) {
        self.maps
            .entry(base_key.to_owned())
            .or_default()
            .insert(sub_key, value);
    }

    /// Expected contents of one map, `None` if never written.
    pub fn map(&self, base_key: &str) -> Option<&BTreeMap<SubKey, Value>> {
        self.maps.get(base_key)
    }

    /// Base keys written so far.
    pub fn base_keys(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    /// Applies `op` to both the model and `map`, asserting that reads
    /// agree.
    pub fn apply(&mut self, map: &dyn AdaptiveMap, op: &MapOperation) {
        match op {
            MapOperation::Put {
                base_key,
                sub_key,
                value,
            } => {
                map.put(base_key, *sub_key, None, value.clone())
                    .expect("Put failed");
                self.put(base_key, *sub_key, value.clone());
            }
            MapOperation::Get { base_key, sub_key } => {
                self.check_get(map, base_key, *sub_key);
            }
        }
    }

    /// Asserts that `get` agrees with the model, including which flavour
    /// of not-found is reported.
    pub fn check_get(&self, map: &dyn AdaptiveMap, base_key: &str, sub_key: SubKey) {
        let actual = map.get(base_key, sub_key);
        match (self.map(base_key), actual) {
            (None, Err(CoreError::MapNotFound { .. })) => {}
            (Some(entries), Err(CoreError::EntryNotFound { .. })) => {
                assert!(
                    !entries.contains_key(&sub_key),
                    "Entry {sub_key} of {base_key} was lost"
                );
            }
            (Some(entries), Ok(value)) => {
                assert_eq!(entries.get(&sub_key), Some(&value), "Wrong value for {sub_key}");
            }
            (expected, actual) => {
                panic!("get({base_key}, {sub_key}): expected {expected:?}, got {actual:?}")
            }
        }
    }

    /// Asserts that `get_all` returns exactly the model's maps, plus
    /// `Ok(None)` for `absent`.
    pub fn check_all(&self, map: &dyn AdaptiveMap, absent: &[&str]) {
        let mut base_keys: Vec<&str> = self.base_keys().collect();
        base_keys.sort_unstable();
        base_keys.extend_from_slice(absent);

        let results = map.get_all(None, &base_keys);
        assert_eq!(results.len(), base_keys.len());
        for (base_key, result) in base_keys.iter().zip(results) {
            let actual = result.expect("Batch read failed");
            assert_eq!(actual.as_ref(), self.map(base_key), "Map {base_key} differs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::memory_engine;
    use adaptmap_core::AddressingMode;

    #[test]
    fn model_tracks_last_write() {
        let mut model = ReferenceModel::new();
        model.put("k", 1, Value::Int(1));
        model.put("k", 1, Value::Int(2));
        assert_eq!(model.map("k").unwrap().get(&1), Some(&Value::Int(2)));
        assert!(model.map("other").is_none());
    }

    #[test]
    fn engine_agrees_with_model() {
        let engine = memory_engine(3, AddressingMode::ValueKey);
        let mut model = ReferenceModel::new();
        for k in [5, 1, 9, 3, 7, 2, 8] {
            model.apply(
                &engine,
                &MapOperation::Put {
                    base_key: "k".into(),
                    sub_key: k,
                    value: Value::Int(k * 2),
                },
            );
        }
        model.check_get(&engine, "k", 4);
        model.check_get(&engine, "absent", 4);
        model.check_all(&engine, &["absent"]);
    }
}
