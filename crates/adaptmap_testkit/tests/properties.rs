//! Property tests for the partition and visibility guarantees.

use adaptmap_core::{AdaptiveMap, SplitStrategy};
use adaptmap_store::{InMemoryStore, SubKey, Value};
use adaptmap_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn entries(map: &dyn AdaptiveMap, base_key: &str) -> BTreeMap<SubKey, Value> {
    map.get_all(None, &[base_key])
        .remove(0)
        .expect("Batch read failed")
        .unwrap_or_default()
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    /// Increasing puts are all readable with their last value.
    #[test]
    fn increasing_puts_are_readable(
        keys in increasing_sub_keys_strategy(120),
        threshold in 1usize..20,
    ) {
        for mode in MODES {
            let engine = memory_engine(threshold, mode);
            for k in &keys {
                engine.put("k", *k, None, Value::Int(k.wrapping_mul(3))).unwrap();
            }
            for k in &keys {
                prop_assert_eq!(engine.get("k", *k).unwrap(), Value::Int(k.wrapping_mul(3)));
            }
        }
    }

    /// Segments stay an ordered, gap-free partition holding exactly the
    /// entries written.
    #[test]
    fn segments_partition_the_entries(
        ops in operation_sequence_strategy(1, 150),
        threshold in 2usize..12,
        median in any::<bool>(),
    ) {
        let strategy = if median { SplitStrategy::Median } else { SplitStrategy::AppendForward };
        let config = test_config(threshold, AddressingMode::ValueKey).with_split_strategy(strategy);
        let engine = engine_on(Arc::new(InMemoryStore::new()), config);
        let mut model = ReferenceModel::new();

        for op in &ops {
            model.apply(&engine, op);
        }

        let base_keys: Vec<String> = model.base_keys().map(str::to_owned).collect();
        for base_key in &base_keys {
            let segments = check_partition(&engine, base_key, threshold);
            let total: usize = segments.iter().map(|s| s.entry_count).sum();
            prop_assert_eq!(total, model.map(base_key).map_or(0, BTreeMap::len));
        }
        model.check_all(&engine, &["never-written"]);
    }

    /// Crossing the threshold neither loses nor duplicates entries.
    #[test]
    fn split_preserves_entries(
        keys in prop::collection::btree_set(-1000i64..1000, 2..60),
        extra in -1000i64..1000,
    ) {
        let keys: Vec<SubKey> = keys.into_iter().filter(|k| *k != extra).collect();
        prop_assume!(!keys.is_empty());
        let threshold = keys.len();
        let config = test_config(threshold, AddressingMode::DigestKey)
            .with_split_strategy(SplitStrategy::Median);
        let engine = engine_on(Arc::new(InMemoryStore::new()), config);

        for k in &keys {
            engine.put("k", *k, None, Value::Int(*k)).unwrap();
        }
        let before = entries(&engine, "k");
        prop_assert_eq!(engine.segments("k").unwrap().len(), 1);

        engine.put("k", extra, None, Value::Int(extra)).unwrap();
        let after = entries(&engine, "k");
        let segments = check_partition(&engine, "k", threshold);

        prop_assert_eq!(segments.len(), 2);
        prop_assert_eq!(after.len(), before.len() + 1);
        prop_assert!(before.iter().all(|(k, v)| after.get(k) == Some(v)));
        prop_assert_eq!(after.get(&extra), Some(&Value::Int(extra)));
    }

    /// Replaying a put after forced conflicts ends in the same state as a
    /// single put.
    #[test]
    fn retried_puts_are_idempotent(
        keys in prop::collection::vec(-50i64..50, 1..80),
        conflicts in 0u32..5,
        threshold in 2usize..8,
    ) {
        let (faulty, store) = faulty_engine(threshold, AddressingMode::ValueKey);
        let clean = memory_engine(threshold, AddressingMode::ValueKey);

        for (i, k) in keys.iter().enumerate() {
            let value = Value::Int(i as i64);
            clean.put("k", *k, None, value.clone()).unwrap();

            store.force_conflicts(conflicts);
            faulty.put("k", *k, None, value.clone()).unwrap();
            // Replay as a client would after a lost acknowledgement
            faulty.put("k", *k, None, value).unwrap();
        }

        prop_assert_eq!(entries(&faulty, "k"), entries(&clean, "k"));
        check_partition(&faulty, "k", threshold);
    }

    /// Both addressing modes observe the same maps.
    #[test]
    fn addressing_modes_are_equivalent(
        ops in operation_sequence_strategy(1, 120),
        threshold in 1usize..10,
    ) {
        let value = memory_engine(threshold, AddressingMode::ValueKey);
        let digest = memory_engine(threshold, AddressingMode::DigestKey);
        let mut model = ReferenceModel::new();

        for op in &ops {
            match op {
                MapOperation::Put { base_key, sub_key, value: v } => {
                    value.put(base_key, *sub_key, None, v.clone()).unwrap();
                    digest.put(base_key, *sub_key, None, v.clone()).unwrap();
                    model.put(base_key, *sub_key, v.clone());
                }
                MapOperation::Get { base_key, sub_key } => {
                    let a = value.get(base_key, *sub_key);
                    let b = digest.get(base_key, *sub_key);
                    prop_assert_eq!(format!("{a:?}"), format!("{b:?}"));
                }
            }
        }

        let mut base_keys: Vec<&str> = model.base_keys().collect();
        base_keys.push("never-written");
        let a: Vec<_> = value.get_all(None, &base_keys).into_iter().map(Result::unwrap).collect();
        let b: Vec<_> = digest.get_all(None, &base_keys).into_iter().map(Result::unwrap).collect();
        prop_assert_eq!(a, b);
    }
}
