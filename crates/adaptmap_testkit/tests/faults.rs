//! Store failures, timeouts and interrupted splits.

use adaptmap_core::{BatchPolicy, CoreError, KeyCodec, RetryConfig, SegmentRecord};
use adaptmap_store::{InMemoryStore, ReadPolicy, RecordStore, Value, WritePolicy};
use adaptmap_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn fill(engine: &dyn AdaptiveMap, base_key: &str, keys: std::ops::Range<i64>) {
    for k in keys {
        engine.put(base_key, k, None, Value::Int(k)).unwrap();
    }
}

#[test]
fn call_timeout_surfaces_as_timeout() {
    let (_, store) = faulty_engine(10, AddressingMode::ValueKey);
    let engine = engine_on(
        Arc::clone(&store),
        test_config(10, AddressingMode::ValueKey).with_call_timeout(Some(Duration::from_millis(5))),
    );
    fill(&engine, "slow", 0..3);

    store.set_latency(Duration::from_millis(40));
    assert!(matches!(
        engine.put("slow", 3, None, Value::Int(3)),
        Err(CoreError::Timeout { .. })
    ));
    assert!(matches!(
        engine.get_all(None, &["slow"]).remove(0),
        Err(CoreError::Timeout { .. })
    ));

    store.set_latency(Duration::ZERO);
    engine.put("slow", 3, None, Value::Int(3)).unwrap();
    assert_eq!(engine.get("slow", 3).unwrap(), Value::Int(3));
}

#[test]
fn operation_timeout_spans_store_calls() {
    let (_, store) = faulty_engine(10, AddressingMode::ValueKey);
    let engine = engine_on(
        Arc::clone(&store),
        test_config(10, AddressingMode::ValueKey)
            .with_operation_timeout(Some(Duration::from_millis(30))),
    );

    // Creating a map takes a read and a write, each slower than half the budget
    store.set_latency(Duration::from_millis(20));
    assert!(matches!(
        engine.put("budget", 1, None, Value::Int(1)),
        Err(CoreError::Timeout { .. })
    ));
}

#[test]
fn batch_timeout_applies_to_each_base_key() {
    let (engine, store) = faulty_engine(10, AddressingMode::ValueKey);
    let base_keys: Vec<String> = (0..10).map(|i| format!("acct:{i}")).collect();
    for base_key in &base_keys {
        fill(&engine, base_key, 0..5);
    }
    assert!(!store.inner().is_empty());

    // One root read per key; five rounds of two take longer than the timeout
    store.set_latency(Duration::from_millis(30));
    let reads_before = store.read_count();
    let policy = BatchPolicy::default()
        .with_timeout(Duration::from_millis(100))
        .with_max_concurrency(2);
    let keys: Vec<&str> = base_keys.iter().map(String::as_str).collect();
    let results = engine.get_all(Some(&policy), &keys);

    assert_eq!(results.len(), 10);
    for (base_key, result) in base_keys.iter().zip(results) {
        let entries = result
            .unwrap_or_else(|e| panic!("{base_key}: {e}"))
            .unwrap();
        assert_eq!(entries.len(), 5);
    }
    assert!(store.read_count() - reads_before >= 10);
}

#[test]
fn unreachable_segment_fails_only_its_base_key() {
    for mode in MODES {
        let (engine, store) = faulty_engine(4, mode);
        for base_key in ["a", "bad", "c"] {
            fill(&engine, base_key, 0..10);
        }

        let codec = KeyCodec::new(NAMESPACE, SET, mode);
        store.fail_key(codec.segment_key("bad", 0).unwrap());

        let results = engine.get_all(None, &["a", "bad", "c", "never"]);
        assert_eq!(results[0].as_ref().unwrap().as_ref().unwrap().len(), 10);
        assert!(
            matches!(results[1], Err(CoreError::StoreUnavailable { .. })),
            "mode {mode:?}: {:?}",
            results[1]
        );
        assert_eq!(results[2].as_ref().unwrap().as_ref().unwrap().len(), 10);
        assert!(matches!(results[3], Ok(None)));
        assert!(engine.stats().errors() >= 1);

        store.heal_keys();
        let healed = engine.get_all(None, &["bad"]).remove(0).unwrap().unwrap();
        assert_eq!(healed.len(), 10);
    }
}

#[test]
fn offline_store_is_unavailable() {
    let (engine, store) = faulty_engine(4, AddressingMode::DigestKey);
    fill(&engine, "k", 0..6);

    store.set_offline(true);
    assert!(matches!(
        engine.get("k", 1),
        Err(CoreError::StoreUnavailable { .. })
    ));
    assert!(matches!(
        engine.put("k", 7, None, Value::Int(7)),
        Err(CoreError::StoreUnavailable { .. })
    ));

    store.set_offline(false);
    engine.put("k", 7, None, Value::Int(7)).unwrap();
    check_partition(&engine, "k", 4);
}

#[test]
fn endless_conflicts_exhaust_the_retry_budget() {
    let (_, store) = faulty_engine(4, AddressingMode::ValueKey);
    let engine = engine_on(
        Arc::clone(&store),
        test_config(4, AddressingMode::ValueKey).with_retry(RetryConfig::new(3)),
    );
    fill(&engine, "hot", 0..2);

    store.force_conflicts(u32::MAX);
    let err = engine.put("hot", 2, None, Value::Int(2)).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ConflictRetryExhausted { attempts: 3, .. }
    ));

    store.force_conflicts(0);
    engine.put("hot", 2, None, Value::Int(2)).unwrap();
    assert_eq!(engine.get("hot", 2).unwrap(), Value::Int(2));
}

/// Commits a split of the root at `boundary` without finishing it, the
/// way a writer that died mid-split leaves it. Returns the committed root.
fn abandon_root_split(
    store: &InMemoryStore,
    mode: AddressingMode,
    base_key: &str,
    boundary: i64,
) -> SegmentRecord {
    let codec = KeyCodec::new(NAMESPACE, SET, mode);
    let root_key = codec.segment_key(base_key, 0).unwrap();

    let successor = store
        .increment(&root_key, "seq", 1, &WritePolicy::new())
        .unwrap() as u32;
    let record = store
        .get(&root_key, &ReadPolicy::default())
        .unwrap()
        .unwrap();
    let root = SegmentRecord::decode(base_key, 0, BIN, record).unwrap();
    let generation = store
        .put_record(
            &root_key,
            root.split_bins(boundary, successor),
            &WritePolicy::new().expect_generation(root.generation),
        )
        .unwrap();
    root.after_split(boundary, successor, generation)
}

#[test]
fn readers_and_writers_recover_an_abandoned_split() {
    for mode in MODES {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine_on(Arc::clone(&store), test_config(4, mode));
        fill(&engine, "k", 0..4);

        abandon_root_split(&store, mode, "k", 2);

        // Upper entries are served from the parent until the successor exists
        let entries = engine.get_all(None, &["k"]).remove(0).unwrap().unwrap();
        assert_eq!(entries.len(), 4, "mode {mode:?}");
        assert_eq!(engine.get("k", 3).unwrap(), Value::Int(3));

        let segments = engine.segments("k").unwrap();
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.splitting));

        engine.put("k", 1, None, Value::Int(100)).unwrap();
        assert!(engine.stats().split_assists() >= 1);

        let segments = check_partition(&engine, "k", 4);
        assert_eq!(segments.len(), 2);
        let entries = engine.get_all(None, &["k"]).remove(0).unwrap().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[&1], Value::Int(100));
    }
}

#[test]
fn materialised_successor_is_not_read_twice() {
    for mode in MODES {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine_on(Arc::clone(&store), test_config(4, mode));
        fill(&engine, "k", 0..4);

        let root = abandon_root_split(&store, mode, "k", 2);
        let successor = root.next.unwrap();
        let codec = KeyCodec::new(NAMESPACE, SET, mode);
        store
            .put_record(
                &codec.segment_key("k", successor).unwrap(),
                root.successor_bins(BIN).unwrap(),
                &WritePolicy::new().create_only(),
            )
            .unwrap();

        let entries = engine.get_all(None, &["k"]).remove(0).unwrap().unwrap();
        assert_eq!(entries.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        // Writing into the parent's range finishes the trim
        engine.put("k", 0, None, Value::Int(-1)).unwrap();
        check_partition(&engine, "k", 4);
        assert_eq!(engine.get("k", 3).unwrap(), Value::Int(3));
    }
}

#[test]
fn walks_pass_an_abandoned_split_of_a_bounded_segment() {
    let store = Arc::new(InMemoryStore::new());
    let writer = engine_on(Arc::clone(&store), test_config(4, AddressingMode::ValueKey));
    fill(&writer, "k", 0..10);
    assert_eq!(writer.segments("k").unwrap().len(), 3);

    abandon_root_split(&store, AddressingMode::ValueKey, "k", 2);

    // A fresh engine has no hints and must walk from the root
    let reader = engine_on(Arc::clone(&store), test_config(4, AddressingMode::ValueKey));
    assert_eq!(reader.get("k", 9).unwrap(), Value::Int(9));
    assert_eq!(reader.get("k", 3).unwrap(), Value::Int(3));
    let entries = reader.get_all(None, &["k"]).remove(0).unwrap().unwrap();
    assert!(entries.keys().copied().eq(0..10));

    reader.put("k", 0, None, Value::Int(0)).unwrap();
    let segments = check_partition(&reader, "k", 4);
    assert_eq!(segments.len(), 4);
}
