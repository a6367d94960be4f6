//! Segment index: finds the segment owning a sub-key and records splits.
//!
//! The chain of segment records is the source of truth. Each segment
//! carries its bounds and the ordinal of its successor, so any segment can
//! be reached by walking forward from the root. The index only shortens
//! that walk:
//!
//! - In value-key mode a per-engine hint cache remembers `lo -> ordinal`
//!   for segments seen recently. Stale hints are harmless: a walk that
//!   lands on a missing record or past the sub-key restarts from the root.
//! - In digest-key mode segment keys cannot be enumerated, so every split
//!   publishes `lo -> ordinal` into an index record next to the segments.
//!
//! # Split protocol
//!
//! 1. Allocate a fresh ordinal from the root's `seq` counter.
//! 2. Commit: rewrite the parent's bounds with a generation check. From
//!    here on the upper range belongs to the new ordinal even though its
//!    record does not exist yet.
//! 3. Materialise the successor with a create-only write.
//! 4. Trim migrated entries from the parent and clear its split state.
//! 5. Publish the new segment to the index.
//!
//! Any writer that finds a split between steps 2 and 4 finishes it before
//! writing. Readers serve the successor's range from the parent meanwhile.

use super::record::{SegmentRecord, BIN_SEGMENTS, BIN_SEQ};
use crate::deadline::Deadline;
use crate::error::{CoreError, CoreResult};
use crate::key::{AddressingMode, KeyCodec};
use crate::stats::EngineStats;
use adaptmap_store::{RecordStore, StoreError, SubKey, Value};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace, warn};

const TRIM_ATTEMPTS: usize = 8;

/// Where a sub-key currently lives.
#[derive(Debug, Clone)]
pub(crate) enum Located {
    /// The owning segment record.
    Segment(SegmentRecord),
    /// The owning segment is still being materialised; its entries are
    /// held by this splitting parent.
    Migrating(SegmentRecord),
}

impl Located {
    /// Ordinal of the segment owning the sub-key.
    pub(crate) fn ordinal(&self) -> u32 {
        match self {
            Self::Segment(segment) => segment.ordinal,
            Self::Migrating(parent) => parent.next.unwrap_or(parent.ordinal),
        }
    }

    pub(crate) fn value(&self, sub_key: SubKey) -> Option<&Value> {
        match self {
            Self::Segment(segment) | Self::Migrating(segment) => segment.entries.get(&sub_key),
        }
    }
}

/// One segment of a chain walk.
#[derive(Debug, Clone)]
pub(crate) struct ChainLink {
    pub(crate) segment: SegmentRecord,
    /// The successor is not materialised yet and its range is served from
    /// this segment's migrating entries.
    pub(crate) serves_successor: bool,
}

/// Locates segments and records splits for one engine.
pub(crate) struct SegmentIndex<S> {
    store: Arc<S>,
    codec: KeyCodec,
    bin: String,
    hints: RwLock<HashMap<String, BTreeMap<SubKey, u32>>>,
    hint_capacity: usize,
    stats: Arc<EngineStats>,
}

impl<S: RecordStore> SegmentIndex<S> {
    pub(crate) fn new(
        store: Arc<S>,
        codec: KeyCodec,
        bin: impl Into<String>,
        hint_capacity: usize,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            store,
            codec,
            bin: bin.into(),
            hints: RwLock::new(HashMap::new()),
            hint_capacity,
            stats,
        }
    }

    pub(crate) fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    fn store_error(
        &self,
        base_key: &str,
        segment: Option<u32>,
        deadline: &Deadline,
        err: StoreError,
    ) -> CoreError {
        CoreError::from_store(base_key, segment, 0, deadline.elapsed(), err)
    }

    /// Reads and decodes one segment record.
    pub(crate) fn read_segment(
        &self,
        base_key: &str,
        ordinal: u32,
        deadline: &Deadline,
    ) -> CoreResult<Option<SegmentRecord>> {
        let key = self.codec.segment_key(base_key, ordinal)?;
        self.stats.record_segment_reads(1);
        match self.store.get(&key, &deadline.read_policy()) {
            Ok(Some(record)) => {
                SegmentRecord::decode(base_key, ordinal, &self.bin, record).map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.store_error(base_key, Some(ordinal), deadline, e)),
        }
    }

    /// Reads many segments in one batch. Missing ordinals are left out.
    fn read_segments(
        &self,
        base_key: &str,
        ordinals: &[u32],
        deadline: &Deadline,
    ) -> CoreResult<HashMap<u32, SegmentRecord>> {
        if ordinals.is_empty() {
            return Ok(HashMap::new());
        }
        let keys = ordinals
            .iter()
            .map(|ordinal| self.codec.segment_key(base_key, *ordinal))
            .collect::<CoreResult<Vec<_>>>()?;
        self.stats.record_segment_reads(keys.len() as u64);

        let results = self.store.batch_get(&keys, &deadline.read_policy());
        let mut segments = HashMap::with_capacity(results.len());
        for (ordinal, result) in ordinals.iter().zip(results) {
            match result {
                Ok(Some(record)) => {
                    let segment = SegmentRecord::decode(base_key, *ordinal, &self.bin, record)?;
                    segments.insert(*ordinal, segment);
                }
                // Ordinals allocated by splits that lost their race
                Ok(None) => {}
                Err(e) => return Err(self.store_error(base_key, Some(*ordinal), deadline, e)),
            }
        }
        Ok(segments)
    }

    /// Published `lo -> ordinal` entries of a digest-mode map.
    fn read_index(
        &self,
        base_key: &str,
        deadline: &Deadline,
    ) -> CoreResult<BTreeMap<SubKey, u32>> {
        let key = self.codec.index_key(base_key)?;
        let record = self
            .store
            .get(&key, &deadline.read_policy())
            .map_err(|e| self.store_error(base_key, None, deadline, e))?;
        let Some(entries) = record.as_ref().and_then(|r| r.map(BIN_SEGMENTS)) else {
            return Ok(BTreeMap::new());
        };
        entries
            .iter()
            .map(|(lo, ordinal)| {
                ordinal
                    .as_int()
                    .and_then(|o| u32::try_from(o).ok())
                    .map(|o| (*lo, o))
                    .ok_or_else(|| CoreError::corrupted(base_key, 0, "bad segment index entry"))
            })
            .collect()
    }

    /// Ordinal to start a walk for `sub_key` from.
    fn start_ordinal(&self, base_key: &str, sub_key: SubKey, deadline: &Deadline) -> CoreResult<u32> {
        let start = match self.codec.mode() {
            AddressingMode::ValueKey => self
                .hints
                .read()
                .get(base_key)
                .and_then(|hints| hints.range(..=sub_key).next_back().map(|(_, o)| *o)),
            AddressingMode::DigestKey => self
                .read_index(base_key, deadline)?
                .range(..=sub_key)
                .next_back()
                .map(|(_, o)| *o),
        };
        Ok(start.unwrap_or(0))
    }

    /// Remembers where a segment starts.
    fn learn(&self, base_key: &str, segment: &SegmentRecord) {
        if self.codec.mode() != AddressingMode::ValueKey || segment.ordinal == 0 {
            return;
        }
        if self
            .hints
            .read()
            .get(base_key)
            .and_then(|hints| hints.get(&segment.lo))
            == Some(&segment.ordinal)
        {
            return;
        }
        let mut hints = self.hints.write();
        if hints.len() >= self.hint_capacity && !hints.contains_key(base_key) {
            hints.clear();
        }
        hints
            .entry(base_key.to_owned())
            .or_default()
            .insert(segment.lo, segment.ordinal);
    }

    /// Drops cached hints for a base key.
    pub(crate) fn forget(&self, base_key: &str) {
        self.hints.write().remove(base_key);
    }

    /// Drops every cached hint.
    pub(crate) fn forget_all(&self) {
        self.hints.write().clear();
    }

    /// Finds the segment owning `sub_key`.
    ///
    /// Returns `None` if the map has no root segment.
    pub(crate) fn locate(
        &self,
        base_key: &str,
        sub_key: SubKey,
        deadline: &Deadline,
    ) -> CoreResult<Option<Located>> {
        let mut ordinal = self.start_ordinal(base_key, sub_key, deadline)?;
        let mut from_root = ordinal == 0;
        let mut previous: Option<SegmentRecord> = None;

        loop {
            deadline.check(base_key)?;
            let Some(segment) = self.read_segment(base_key, ordinal, deadline)? else {
                if let Some(parent) = previous.take() {
                    if parent.next == Some(ordinal) && parent.is_splitting() {
                        if parent.pending_owns(sub_key) {
                            return Ok(Some(Located::Migrating(parent)));
                        }
                        // Past the pending successor: go on from the old one
                        if let Some(after) = parent.pending.and_then(|p| p.next) {
                            ordinal = after;
                            continue;
                        }
                    }
                }
                if from_root && ordinal != 0 {
                    return Err(CoreError::corrupted(
                        base_key,
                        ordinal,
                        "segment referenced but missing",
                    ));
                }
                if from_root {
                    return Ok(None);
                }
                trace!(base_key, ordinal, "stale segment hint");
                self.forget(base_key);
                ordinal = 0;
                from_root = true;
                continue;
            };

            if segment.lo > sub_key {
                if from_root {
                    return Err(CoreError::corrupted(base_key, ordinal, "chain out of order"));
                }
                trace!(base_key, ordinal, "hint points past sub-key");
                self.forget(base_key);
                ordinal = 0;
                from_root = true;
                previous = None;
                continue;
            }

            if segment.owns(sub_key) {
                self.learn(base_key, &segment);
                return Ok(Some(Located::Segment(segment)));
            }

            let Some(next) = segment.next else {
                return Err(CoreError::corrupted(
                    base_key,
                    ordinal,
                    "bounded segment without successor",
                ));
            };
            self.learn(base_key, &segment);
            ordinal = next;
            previous = Some(segment);
        }
    }

    /// Allocates an unused segment ordinal.
    pub(crate) fn allocate_ordinal(&self, base_key: &str, deadline: &Deadline) -> CoreResult<u32> {
        let key = self.codec.segment_key(base_key, 0)?;
        let next = self
            .store
            .increment(&key, BIN_SEQ, 1, &deadline.write_policy())
            .map_err(|e| self.store_error(base_key, Some(0), deadline, e))?;
        u32::try_from(next)
            .map_err(|_| CoreError::corrupted(base_key, 0, "ordinal space exhausted"))
    }

    /// Creates the root segment holding a single entry.
    ///
    /// Returns `false` if another writer created it first.
    pub(crate) fn create_root(
        &self,
        base_key: &str,
        sub_key: SubKey,
        value: Value,
        deadline: &Deadline,
    ) -> CoreResult<bool> {
        let key = self.codec.segment_key(base_key, 0)?;
        let bins = SegmentRecord::root_bins(&self.bin, sub_key, value);
        match self
            .store
            .put_record(&key, bins, &deadline.write_policy().create_only())
        {
            Ok(_) => {
                debug!(base_key, "created map");
                self.stats.record_root_created();
                self.publish(base_key, SubKey::MIN, 0, deadline);
                Ok(true)
            }
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(self.store_error(base_key, Some(0), deadline, e)),
        }
    }

    /// Commits a split of `segment` at `boundary` and completes it.
    ///
    /// Returns `false` if the segment changed since it was read.
    pub(crate) fn record_split(
        &self,
        base_key: &str,
        segment: &SegmentRecord,
        boundary: SubKey,
        successor: u32,
        deadline: &Deadline,
    ) -> CoreResult<bool> {
        let key = self.codec.segment_key(base_key, segment.ordinal)?;
        let policy = deadline.write_policy().expect_generation(segment.generation);
        match self
            .store
            .put_record(&key, segment.split_bins(boundary, successor), &policy)
        {
            Ok(generation) => {
                debug!(
                    base_key,
                    segment = segment.ordinal,
                    successor,
                    boundary,
                    "split committed"
                );
                self.stats.record_split();
                let committed = segment.after_split(boundary, successor, generation);
                self.complete_split(base_key, &committed, deadline)?;
                Ok(true)
            }
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(self.store_error(base_key, Some(segment.ordinal), deadline, e)),
        }
    }

    /// Finishes an in-flight split of `parent`.
    ///
    /// Safe to call from any number of writers at once.
    pub(crate) fn complete_split(
        &self,
        base_key: &str,
        parent: &SegmentRecord,
        deadline: &Deadline,
    ) -> CoreResult<()> {
        let (Some(successor), Some(lo), Some(bins)) =
            (parent.next, parent.hi, parent.successor_bins(&self.bin))
        else {
            return Ok(());
        };

        let child_key = self.codec.segment_key(base_key, successor)?;
        match self
            .store
            .put_record(&child_key, bins, &deadline.write_policy().create_only())
        {
            Ok(_) => trace!(base_key, segment = successor, "successor materialised"),
            Err(StoreError::RecordExists { .. }) => {}
            // The successor may not exist: leave the parent untouched
            Err(e) if e.is_conflict() => return Ok(()),
            Err(e) => return Err(self.store_error(base_key, Some(successor), deadline, e)),
        }

        self.trim(base_key, parent, deadline)?;
        self.publish(base_key, lo, successor, deadline);
        Ok(())
    }

    /// Drops migrated entries and the split state from `parent`.
    ///
    /// Ordinal allocation bumps the root's generation without touching a
    /// split, so a lost race is retried while the same split is pending.
    fn trim(&self, base_key: &str, parent: &SegmentRecord, deadline: &Deadline) -> CoreResult<()> {
        let key = self.codec.segment_key(base_key, parent.ordinal)?;
        let mut current = parent.clone();
        for _ in 0..TRIM_ATTEMPTS {
            let policy = deadline.write_policy().expect_generation(current.generation);
            match self
                .store
                .put_record(&key, current.trim_bins(&self.bin), &policy)
            {
                Ok(_) => {
                    trace!(base_key, segment = parent.ordinal, "split completed");
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {}
                Err(e) => return Err(self.store_error(base_key, Some(parent.ordinal), deadline, e)),
            }
            match self.read_segment(base_key, parent.ordinal, deadline)? {
                Some(fresh)
                    if fresh.is_splitting()
                        && fresh.hi == parent.hi
                        && fresh.next == parent.next =>
                {
                    current = fresh;
                }
                // Someone else finished it
                _ => return Ok(()),
            }
        }
        trace!(base_key, segment = parent.ordinal, "trim left to the next writer");
        Ok(())
    }

    /// Makes a new segment findable without a walk from the root.
    fn publish(&self, base_key: &str, lo: SubKey, ordinal: u32, deadline: &Deadline) {
        match self.codec.mode() {
            AddressingMode::ValueKey => {
                let mut hints = self.hints.write();
                if hints.len() >= self.hint_capacity && !hints.contains_key(base_key) {
                    hints.clear();
                }
                if ordinal != 0 {
                    hints.entry(base_key.to_owned()).or_default().insert(lo, ordinal);
                }
            }
            AddressingMode::DigestKey => {
                let result = self.codec.index_key(base_key).and_then(|key| {
                    self.store
                        .put_map_entry(
                            &key,
                            BIN_SEGMENTS,
                            lo,
                            Value::Int(i64::from(ordinal)),
                            &deadline.write_policy(),
                        )
                        .map_err(|e| self.store_error(base_key, None, deadline, e))
                });
                // The chain stays walkable from the root without the entry
                if let Err(e) = result {
                    warn!(base_key, segment = ordinal, error = %e, "failed to publish segment");
                }
            }
        }
    }

    /// Walks the whole chain of a map, prefetching known segments in one
    /// batch.
    ///
    /// Returns `None` if the map has no root segment.
    pub(crate) fn chain(
        &self,
        base_key: &str,
        deadline: &Deadline,
    ) -> CoreResult<Option<Vec<ChainLink>>> {
        let Some(root) = self.read_segment(base_key, 0, deadline)? else {
            return Ok(None);
        };
        let candidates: Vec<u32> = match self.codec.mode() {
            AddressingMode::ValueKey => (1..=root.seq).collect(),
            AddressingMode::DigestKey => self
                .read_index(base_key, deadline)?
                .into_values()
                .filter(|ordinal| *ordinal != 0)
                .collect(),
        };
        let mut prefetched = self.read_segments(base_key, &candidates, deadline)?;
        self.follow(base_key, root, None, &mut prefetched, deadline)
            .map(Some)
    }

    /// Walks the segments overlapping `[from, to)`.
    ///
    /// Returns `None` if the map has no root segment.
    pub(crate) fn range(
        &self,
        base_key: &str,
        from: SubKey,
        to: SubKey,
        deadline: &Deadline,
    ) -> CoreResult<Option<Vec<ChainLink>>> {
        let first = match self.locate(base_key, from, deadline)? {
            None => return Ok(None),
            Some(Located::Segment(segment)) | Some(Located::Migrating(segment)) => segment,
        };
        self.follow(base_key, first, Some(to), &mut HashMap::new(), deadline)
            .map(Some)
    }

    /// Follows successor links from `first` until the chain ends or a
    /// segment starts at or after `until`.
    fn follow(
        &self,
        base_key: &str,
        first: SegmentRecord,
        until: Option<SubKey>,
        prefetched: &mut HashMap<u32, SegmentRecord>,
        deadline: &Deadline,
    ) -> CoreResult<Vec<ChainLink>> {
        let mut links = Vec::new();
        let mut current = Some(first);

        while let Some(segment) = current.take() {
            deadline.check(base_key)?;
            self.learn(base_key, &segment);
            let mut link = ChainLink {
                segment,
                serves_successor: false,
            };

            let reached_end = |segment: &SegmentRecord| until.is_some_and(|to| segment.lo >= to);
            if let Some(next) = link.segment.next {
                match self.take_segment(base_key, next, prefetched, deadline)? {
                    Some(child) => current = Some(child),
                    None if link.segment.is_splitting() => {
                        link.serves_successor = true;
                        let after = link.segment.pending.and_then(|p| p.next);
                        if let Some(after) = after {
                            let child = self
                                .take_segment(base_key, after, prefetched, deadline)?
                                .ok_or_else(|| {
                                    CoreError::corrupted(
                                        base_key,
                                        after,
                                        "segment referenced but missing",
                                    )
                                })?;
                            current = Some(child);
                        }
                    }
                    None => {
                        return Err(CoreError::corrupted(
                            base_key,
                            next,
                            "segment referenced but missing",
                        ));
                    }
                }
            }

            if let Some(child) = &current {
                // Bounds strictly increase along the chain, which also rules out cycles
                if child.lo <= link.segment.lo {
                    return Err(CoreError::corrupted(base_key, child.ordinal, "chain out of order"));
                }
                if reached_end(child) {
                    current = None;
                }
            }
            links.push(link);
        }

        Ok(links)
    }

    fn take_segment(
        &self,
        base_key: &str,
        ordinal: u32,
        prefetched: &mut HashMap<u32, SegmentRecord>,
        deadline: &Deadline,
    ) -> CoreResult<Option<SegmentRecord>> {
        match prefetched.remove(&ordinal) {
            Some(segment) => Ok(Some(segment)),
            None => self.read_segment(base_key, ordinal, deadline),
        }
    }
}
