//! Split decisions.

use crate::segment::SegmentRecord;
use adaptmap_store::SubKey;

/// Where a full segment is divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitStrategy {
    /// Split at the incoming sub-key when it is beyond every stored key,
    /// so that the new segment receives all later appends. Falls back to
    /// `Median` for out-of-order inserts.
    #[default]
    AppendForward,
    /// Split at the median of the stored keys plus the incoming key.
    Median,
}

/// Decides when segments split and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPolicy {
    threshold: usize,
    strategy: SplitStrategy,
}

impl SplitPolicy {
    /// Creates a policy. `threshold` must be positive.
    pub fn new(threshold: usize, strategy: SplitStrategy) -> Self {
        Self {
            threshold: threshold.max(1),
            strategy,
        }
    }

    /// Entries per segment that trigger a split.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The boundary strategy.
    pub fn strategy(&self) -> SplitStrategy {
        self.strategy
    }

    /// Returns true once a segment holding `entry_count` entries may not
    /// accept another new sub-key.
    pub fn should_split(&self, entry_count: usize) -> bool {
        entry_count >= self.threshold
    }

    /// Chooses the boundary for splitting `segment` to make room for
    /// `incoming`, which the segment owns but does not yet hold.
    ///
    /// The result `b` satisfies `lo < b <= max(keys ∪ {incoming})`, so both
    /// `[lo, b)` and `[b, hi)` are non-empty, and neither side holds more
    /// than `threshold` entries once `incoming` is inserted.
    pub fn choose_boundary(&self, segment: &SegmentRecord, incoming: SubKey) -> SubKey {
        let live: Vec<SubKey> = segment.live_entries().map(|(k, _)| *k).collect();
        match self.strategy {
            SplitStrategy::AppendForward if live.last().map_or(true, |max| incoming > *max) => {
                // `lo < incoming` unless the segment is empty, which never splits
                if incoming > segment.lo {
                    incoming
                } else {
                    median_boundary(&live, incoming)
                }
            }
            _ => median_boundary(&live, incoming),
        }
    }
}

/// Median of `keys ∪ {incoming}`; the upper half starts at the boundary.
fn median_boundary(keys: &[SubKey], incoming: SubKey) -> SubKey {
    let position = keys.partition_point(|k| *k < incoming);
    let len = keys.len() + 1;
    let mid = len / 2;
    // Index `mid` of the merged sequence without materialising it
    match mid.cmp(&position) {
        std::cmp::Ordering::Less => keys[mid],
        std::cmp::Ordering::Equal => incoming,
        std::cmp::Ordering::Greater => keys[mid - 1],
    }
}
