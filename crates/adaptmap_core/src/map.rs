//! The `AdaptiveMap` contract.
//!
//! Callers see one unbounded ordered map per base key. How the map is cut
//! into store records is the engine's business.

use crate::config::BatchPolicy;
use crate::engine::AdaptiveMapEngine;
use crate::error::CoreResult;
use adaptmap_store::{MapPolicy, RecordStore, SubKey, Value};
use std::collections::BTreeMap;

/// Outcome for one base key of a batch read.
///
/// `Ok(None)` marks a base key that was never written.
pub type BatchResult = CoreResult<Option<BTreeMap<SubKey, Value>>>;

/// Logical ordered maps keyed by base key.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; calls may come from any number
/// of threads, and of processes sharing the same store.
pub trait AdaptiveMap: Send + Sync {
    /// Reads one entry.
    ///
    /// # Errors
    ///
    /// `MapNotFound` and `EntryNotFound` are distinct so that callers can
    /// tell a new map from a missing entry.
    fn get(&self, base_key: &str, sub_key: SubKey) -> CoreResult<Value>;

    /// Writes one entry. `policy` overrides the default map write mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the write mode rejects the entry, retries run
    /// out, or the store fails.
    fn put(
        &self,
        base_key: &str,
        sub_key: SubKey,
        policy: Option<&MapPolicy>,
        value: Value,
    ) -> CoreResult<()>;

    /// Reads whole maps, one result per base key in input order.
    fn get_all(&self, policy: Option<&BatchPolicy>, base_keys: &[&str]) -> Vec<BatchResult>;
}

impl<S: RecordStore> AdaptiveMap for AdaptiveMapEngine<S> {
    fn get(&self, base_key: &str, sub_key: SubKey) -> CoreResult<Value> {
        AdaptiveMapEngine::get(self, base_key, sub_key)
    }

    fn put(
        &self,
        base_key: &str,
        sub_key: SubKey,
        policy: Option<&MapPolicy>,
        value: Value,
    ) -> CoreResult<()> {
        AdaptiveMapEngine::put(self, base_key, sub_key, policy, value)
    }

    fn get_all(&self, policy: Option<&BatchPolicy>, base_keys: &[&str]) -> Vec<BatchResult> {
        AdaptiveMapEngine::get_all(self, policy, base_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::error::CoreError;
    use adaptmap_store::InMemoryStore;
    use std::sync::Arc;

    /// Appends to the list at `sub_key`, starting a new list when absent.
    fn append(map: &dyn AdaptiveMap, base_key: &str, sub_key: SubKey, item: Value) {
        let list = match map.get(base_key, sub_key) {
            Ok(Value::List(mut items)) => {
                items.push(item);
                items
            }
            Ok(other) => panic!("unexpected value {other:?}"),
            Err(e) if e.is_not_found() => vec![item],
            Err(e) => panic!("get failed: {e}"),
        };
        map.put(base_key, sub_key, None, Value::List(list)).unwrap();
    }

    #[test]
    fn usable_as_trait_object() {
        let config = MapConfig::new("test", "txns", "mapBin").with_split_threshold(3);
        let engine = AdaptiveMapEngine::new(Arc::new(InMemoryStore::new()), config).unwrap();
        let map: &dyn AdaptiveMap = &engine;

        for sub_key in 0..5 {
            append(map, "c:1", sub_key, Value::Int(1));
            append(map, "c:1", sub_key, Value::Int(2));
        }

        let results = map.get_all(None, &["c:1", "c:2"]);
        let entries = results[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(entries.len(), 5);
        assert!(entries
            .values()
            .all(|v| v.as_list().map(<[Value]>::len) == Some(2)));
        assert!(matches!(results[1], Ok(None)));
        assert!(matches!(map.get("c:2", 0), Err(CoreError::MapNotFound { .. })));
    }
}
