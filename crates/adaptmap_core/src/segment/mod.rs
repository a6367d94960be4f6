//! Segment records and the segment index.
//!
//! A segment is one store record holding a contiguous sub-key range of a
//! logical map. Segments of one base key form a chain ordered by range:
//! each segment knows its bounds and the ordinal of its successor.

mod index;
mod record;

pub(crate) use index::{ChainLink, Located, SegmentIndex};
pub use record::{PendingSplit, SegmentInfo, SegmentRecord, RESERVED_BINS};
