//! Segment record layout.

use crate::error::{CoreError, CoreResult};
use adaptmap_store::{Record, RecordKey, SubKey, Value};
use std::collections::BTreeMap;
use std::ops::Bound;

pub(crate) const BIN_LO: &str = "lo";
pub(crate) const BIN_HI: &str = "hi";
pub(crate) const BIN_NEXT: &str = "next";
pub(crate) const BIN_SPLITTING: &str = "splitting";
pub(crate) const BIN_SPLIT_HI: &str = "split_hi";
pub(crate) const BIN_SPLIT_NEXT: &str = "split_next";
pub(crate) const BIN_SEQ: &str = "seq";
pub(crate) const BIN_SEGMENTS: &str = "segments";

/// Bin names used for segment metadata; the entries bin may not reuse them.
pub const RESERVED_BINS: &[&str] = &[
    BIN_LO,
    BIN_HI,
    BIN_NEXT,
    BIN_SPLITTING,
    BIN_SPLIT_HI,
    BIN_SPLIT_NEXT,
    BIN_SEQ,
    BIN_SEGMENTS,
];

/// State a segment keeps while its upper part moves to a new successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSplit {
    /// Upper bound the segment had before the split.
    pub hi: Option<SubKey>,
    /// Successor the segment had before the split.
    pub next: Option<u32>,
}

/// A decoded segment record.
///
/// The range is `[lo, hi)`, with `hi == None` meaning open-ended. While a
/// split is in flight the record still holds the entries at or above `hi`
/// until the successor has been materialised.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    /// Segment ordinal within its base key.
    pub ordinal: u32,
    /// Store generation the record was read at.
    pub generation: u32,
    /// Inclusive lower bound. Never changes after creation.
    pub lo: SubKey,
    /// Exclusive upper bound.
    pub hi: Option<SubKey>,
    /// Ordinal of the next segment in range order.
    pub next: Option<u32>,
    /// Set while a split is in flight.
    pub pending: Option<PendingSplit>,
    /// Ordinal allocator; only meaningful on the root segment.
    pub seq: u32,
    /// Entries, including any not yet migrated to the successor.
    pub entries: BTreeMap<SubKey, Value>,
}

impl SegmentRecord {
    /// Decodes a stored record.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if metadata bins are missing or mistyped.
    pub fn decode(base_key: &str, ordinal: u32, bin: &str, mut record: Record) -> CoreResult<Self> {
        let corrupt = |message: &str| CoreError::corrupted(base_key, ordinal, message);

        let lo = record.int(BIN_LO).ok_or_else(|| corrupt("missing lower bound"))?;
        let hi = record.int(BIN_HI);
        let next = opt_ordinal(record.int(BIN_NEXT)).map_err(|()| corrupt("bad successor"))?;
        let pending = if record.bin(BIN_SPLITTING).is_some() {
            Some(PendingSplit {
                hi: record.int(BIN_SPLIT_HI),
                next: opt_ordinal(record.int(BIN_SPLIT_NEXT))
                    .map_err(|()| corrupt("bad pending successor"))?,
            })
        } else {
            None
        };
        let seq = opt_ordinal(record.int(BIN_SEQ))
            .map_err(|()| corrupt("bad ordinal allocator"))?
            .unwrap_or(0);
        let entries = match record.take_bin(bin) {
            None => BTreeMap::new(),
            Some(Value::Map(entries)) => entries,
            Some(_) => return Err(corrupt("entries bin is not a map")),
        };

        if hi.is_some_and(|hi| hi <= lo) {
            return Err(corrupt("empty range"));
        }

        Ok(Self {
            ordinal,
            generation: record.generation,
            lo,
            hi,
            next,
            pending,
            seq,
            entries,
        })
    }

    /// Bins of a brand-new root segment holding one entry.
    pub fn root_bins(bin: &str, sub_key: SubKey, value: Value) -> Vec<(String, Value)> {
        let mut entries = BTreeMap::new();
        entries.insert(sub_key, value);
        vec![
            (bin.to_owned(), Value::Map(entries)),
            (BIN_LO.to_owned(), Value::Int(SubKey::MIN)),
        ]
    }

    /// Returns true if `sub_key` falls inside this segment's range.
    pub fn owns(&self, sub_key: SubKey) -> bool {
        self.lo <= sub_key && self.hi.map_or(true, |hi| sub_key < hi)
    }

    /// Returns true while a split of this segment is in flight.
    pub fn is_splitting(&self) -> bool {
        self.pending.is_some()
    }

    /// Entries inside the segment's own range.
    pub fn live_entries(&self) -> impl Iterator<Item = (&SubKey, &Value)> {
        let upper = self.hi.map_or(Bound::Unbounded, Bound::Excluded);
        self.entries.range((Bound::Included(self.lo), upper))
    }

    /// Number of entries inside the segment's own range.
    pub fn entry_count(&self) -> usize {
        self.live_entries().count()
    }

    /// Entries waiting to move to the successor of an in-flight split.
    pub fn migrating_entries(&self) -> impl Iterator<Item = (&SubKey, &Value)> {
        let (lower, upper) = match (self.hi, self.pending) {
            (Some(hi), Some(pending)) => (
                Bound::Included(hi),
                pending.hi.map_or(Bound::Unbounded, Bound::Excluded),
            ),
            // Not splitting: an empty range
            _ => (Bound::Excluded(SubKey::MAX), Bound::Unbounded),
        };
        self.entries.range((lower, upper))
    }

    /// Returns true if a pending successor would own `sub_key`.
    pub fn pending_owns(&self, sub_key: SubKey) -> bool {
        match (self.hi, self.pending) {
            (Some(hi), Some(pending)) => hi <= sub_key && pending.hi.map_or(true, |h| sub_key < h),
            _ => false,
        }
    }

    /// Bins that commit a split at `boundary`, handing `[boundary, hi)` to
    /// the segment `successor`. Entries stay in place until migrated.
    pub fn split_bins(&self, boundary: SubKey, successor: u32) -> Vec<(String, Value)> {
        vec![
            (BIN_HI.to_owned(), Value::Int(boundary)),
            (BIN_NEXT.to_owned(), Value::Int(i64::from(successor))),
            (BIN_SPLITTING.to_owned(), Value::Bool(true)),
            (BIN_SPLIT_HI.to_owned(), Value::from(self.hi)),
            (
                BIN_SPLIT_NEXT.to_owned(),
                Value::from(self.next.map(i64::from)),
            ),
        ]
    }

    /// The local view of this record after `split_bins` was committed.
    pub fn after_split(&self, boundary: SubKey, successor: u32, generation: u32) -> Self {
        Self {
            generation,
            hi: Some(boundary),
            next: Some(successor),
            pending: Some(PendingSplit {
                hi: self.hi,
                next: self.next,
            }),
            ..self.clone()
        }
    }

    /// Bins of the successor being materialised from an in-flight split.
    ///
    /// Returns `None` if this segment is not splitting.
    pub fn successor_bins(&self, bin: &str) -> Option<Vec<(String, Value)>> {
        let (hi, pending) = (self.hi?, self.pending?);
        let entries: BTreeMap<SubKey, Value> = self
            .migrating_entries()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        Some(vec![
            (bin.to_owned(), Value::Map(entries)),
            (BIN_LO.to_owned(), Value::Int(hi)),
            (BIN_HI.to_owned(), Value::from(pending.hi)),
            (BIN_NEXT.to_owned(), Value::from(pending.next.map(i64::from))),
        ])
    }

    /// Bins that finish a split: drop migrated entries and the pending state.
    pub fn trim_bins(&self, bin: &str) -> Vec<(String, Value)> {
        let entries: BTreeMap<SubKey, Value> = self
            .live_entries()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        vec![
            (bin.to_owned(), Value::Map(entries)),
            (BIN_SPLITTING.to_owned(), Value::Null),
            (BIN_SPLIT_HI.to_owned(), Value::Null),
            (BIN_SPLIT_NEXT.to_owned(), Value::Null),
        ]
    }
}

fn opt_ordinal(value: Option<i64>) -> Result<Option<u32>, ()> {
    value.map(|v| u32::try_from(v).map_err(|_| ())).transpose()
}

/// A segment as reported by inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Segment ordinal.
    pub ordinal: u32,
    /// Inclusive lower bound.
    pub lower: SubKey,
    /// Exclusive upper bound, `None` if open-ended.
    pub upper: Option<SubKey>,
    /// Physical record key.
    pub physical_key: RecordKey,
    /// Entries in range.
    pub entry_count: usize,
    /// True if the segment's split is still in flight.
    pub splitting: bool,
}
