//! Inspect command implementation.

use super::history::{self, HistorySpec};
use adaptmap_core::{AdaptiveMapEngine, SegmentInfo};
use adaptmap_store::RecordStore;
use serde::Serialize;

/// Segment layout of one base key.
#[derive(Debug, Serialize)]
pub struct MapLayout {
    /// Base key.
    pub base_key: String,
    /// Segments in range order.
    pub segments: Vec<SegmentRow>,
}

/// One segment of a layout.
#[derive(Debug, Serialize)]
pub struct SegmentRow {
    /// Segment ordinal.
    pub ordinal: u32,
    /// Inclusive lower bound, `None` for the root.
    pub lower: Option<i64>,
    /// Exclusive upper bound, `None` if open-ended.
    pub upper: Option<i64>,
    /// Physical record key.
    pub physical_key: String,
    /// Entries in range.
    pub entries: usize,
    /// Split still in flight.
    pub splitting: bool,
}

impl From<SegmentInfo> for SegmentRow {
    fn from(info: SegmentInfo) -> Self {
        Self {
            ordinal: info.ordinal,
            lower: (info.lower != i64::MIN).then_some(info.lower),
            upper: info.upper,
            physical_key: info.physical_key.to_string(),
            entries: info.entry_count,
            splitting: info.splitting,
        }
    }
}

/// Runs the inspect command.
pub fn run<S: RecordStore>(
    engine: &AdaptiveMapEngine<S>,
    spec: &HistorySpec,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    engine.truncate()?;
    let base_keys = history::load(engine, spec)?;

    let mut layouts = Vec::with_capacity(base_keys.len());
    for base_key in base_keys {
        let segments = engine
            .segments(&base_key)?
            .into_iter()
            .map(SegmentRow::from)
            .collect();
        layouts.push(MapLayout { base_key, segments });
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&layouts)?),
        _ => print_text_output(&layouts),
    }

    Ok(())
}

fn print_text_output(layouts: &[MapLayout]) {
    println!("AdaptMap Segment Layout");
    println!("=======================");
    for layout in layouts {
        println!();
        println!("{} ({} segments)", layout.base_key, layout.segments.len());
        for row in &layout.segments {
            println!(
                "  [{}] {} .. {}  {} entries  {}{}",
                row.ordinal,
                bound(row.lower),
                bound(row.upper),
                row.entries,
                row.physical_key,
                if row.splitting { "  (splitting)" } else { "" }
            );
        }
    }
}

fn bound(value: Option<i64>) -> String {
    value.map_or_else(|| "*".to_string(), |v| v.to_string())
}
