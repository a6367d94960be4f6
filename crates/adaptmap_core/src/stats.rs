//! Engine statistics.
//!
//! All counters are atomic and may be read while operations are running.
//!
//! ```rust,ignore
//! let engine = AdaptiveMapEngine::new(store, config)?;
//! engine.put("k", 1, None, Value::Int(1))?;
//! let stats = engine.stats().snapshot();
//! println!("splits: {}", stats.splits);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine statistics and metrics.
#[derive(Debug, Default)]
pub struct EngineStats {
    gets: AtomicU64,
    puts: AtomicU64,
    batch_keys: AtomicU64,
    segment_reads: AtomicU64,
    roots_created: AtomicU64,
    splits: AtomicU64,
    split_assists: AtomicU64,
    conflict_retries: AtomicU64,
    errors: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_key(&self) {
        self.batch_keys.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_segment_reads(&self, count: u64) {
        self.segment_reads.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_root_created(&self) {
        self.roots_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_split(&self) {
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    /// A writer finished a split another writer had committed.
    pub(crate) fn record_split_assist(&self) {
        self.split_assists.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict_retry(&self) {
        self.conflict_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Total `get` calls.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Total `put` calls.
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Total base keys requested through `get_all`.
    pub fn batch_keys(&self) -> u64 {
        self.batch_keys.load(Ordering::Relaxed)
    }

    /// Total segment records read.
    pub fn segment_reads(&self) -> u64 {
        self.segment_reads.load(Ordering::Relaxed)
    }

    /// Logical maps created.
    pub fn roots_created(&self) -> u64 {
        self.roots_created.load(Ordering::Relaxed)
    }

    /// Splits committed by this engine.
    pub fn splits(&self) -> u64 {
        self.splits.load(Ordering::Relaxed)
    }

    /// In-flight splits this engine helped complete.
    pub fn split_assists(&self) -> u64 {
        self.split_assists.load(Ordering::Relaxed)
    }

    /// Retries caused by generation conflicts.
    pub fn conflict_retries(&self) -> u64 {
        self.conflict_retries.load(Ordering::Relaxed)
    }

    /// Operations that returned an error other than not-found.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets(),
            puts: self.puts(),
            batch_keys: self.batch_keys(),
            segment_reads: self.segment_reads(),
            roots_created: self.roots_created(),
            splits: self.splits(),
            split_assists: self.split_assists(),
            conflict_retries: self.conflict_retries(),
            errors: self.errors(),
        }
    }
}

/// A point-in-time snapshot of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Total `get` calls.
    pub gets: u64,
    /// Total `put` calls.
    pub puts: u64,
    /// Total base keys requested through `get_all`.
    pub batch_keys: u64,
    /// Total segment records read.
    pub segment_reads: u64,
    /// Logical maps created.
    pub roots_created: u64,
    /// Splits committed.
    pub splits: u64,
    /// In-flight splits helped to completion.
    pub split_assists: u64,
    /// Retries caused by generation conflicts.
    pub conflict_retries: u64,
    /// Failed operations.
    pub errors: u64,
}
