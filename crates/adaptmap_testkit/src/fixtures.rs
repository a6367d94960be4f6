//! Engine fixtures and invariant checks.

use adaptmap_core::{AdaptiveMapEngine, AddressingMode, MapConfig, RetryConfig, SegmentInfo};
use adaptmap_store::{FaultInjectingStore, InMemoryStore, RecordStore, SubKey};
use std::sync::Arc;

/// Namespace used by fixtures.
pub const NAMESPACE: &str = "test";
/// Set used by fixtures.
pub const SET: &str = "testAdapt";
/// Entries bin used by fixtures.
pub const BIN: &str = "mapBin";

/// Both addressing modes, for tests that must hold in each.
pub const MODES: [AddressingMode; 2] = [AddressingMode::ValueKey, AddressingMode::DigestKey];

/// An engine over the fault-injecting store.
pub type FaultyEngine = AdaptiveMapEngine<FaultInjectingStore<InMemoryStore>>;

/// Fixture configuration with the given threshold and mode.
///
/// The retry budget is generous so that contended tests do not flake.
pub fn test_config(threshold: usize, mode: AddressingMode) -> MapConfig {
    MapConfig::new(NAMESPACE, SET, BIN)
        .with_split_threshold(threshold)
        .with_addressing(mode)
        .with_retry(RetryConfig::new(1_000))
}

/// An engine over a fresh in-memory store.
pub fn memory_engine(threshold: usize, mode: AddressingMode) -> AdaptiveMapEngine<InMemoryStore> {
    engine_on(Arc::new(InMemoryStore::new()), test_config(threshold, mode))
}

/// An engine over a fresh fault-injecting store, with the store handle.
pub fn faulty_engine(
    threshold: usize,
    mode: AddressingMode,
) -> (FaultyEngine, Arc<FaultInjectingStore<InMemoryStore>>) {
    let store = Arc::new(FaultInjectingStore::new(InMemoryStore::new()));
    let engine = engine_on(Arc::clone(&store), test_config(threshold, mode));
    (engine, store)
}

/// An engine sharing an existing store, as a second client would.
pub fn engine_on<S: RecordStore>(store: Arc<S>, config: MapConfig) -> AdaptiveMapEngine<S> {
    AdaptiveMapEngine::new(store, config).expect("Fixture configuration is valid")
}

/// Runs a test with an engine over a fresh in-memory store.
pub fn with_engine<F, R>(threshold: usize, mode: AddressingMode, f: F) -> R
where
    F: FnOnce(&AdaptiveMapEngine<InMemoryStore>) -> R,
{
    let engine = memory_engine(threshold, mode);
    f(&engine)
}

/// Asserts that the segments of `base_key` partition the sub-key space:
/// ordered, gap-free, no split in flight and none over `threshold`.
///
/// Returns the segments for further checks.
pub fn check_partition<S: RecordStore>(
    engine: &AdaptiveMapEngine<S>,
    base_key: &str,
    threshold: usize,
) -> Vec<SegmentInfo> {
    let segments = engine.segments(base_key).expect("Failed to list segments");

    let first = segments.first().expect("A map has at least one segment");
    assert_eq!(first.ordinal, 0, "Chain must start at the root");
    assert_eq!(first.lower, SubKey::MIN, "Root must own the lowest sub-keys");
    assert_eq!(
        segments.last().and_then(|s| s.upper),
        None,
        "Last segment must be open-ended"
    );
    for pair in segments.windows(2) {
        assert_eq!(
            pair[0].upper,
            Some(pair[1].lower),
            "Segments {} and {} must be adjacent",
            pair[0].ordinal,
            pair[1].ordinal
        );
        assert!(pair[0].lower < pair[1].lower, "Segments must be ordered");
    }
    for segment in &segments {
        assert!(!segment.splitting, "Segment {} still splitting", segment.ordinal);
        assert!(
            segment.entry_count <= threshold,
            "Segment {} holds {} entries",
            segment.ordinal,
            segment.entry_count
        );
    }
    segments
}
