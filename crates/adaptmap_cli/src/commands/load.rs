//! Load-history command implementation.

use super::history::{self, HistorySpec};
use adaptmap_core::{AdaptiveMap, AdaptiveMapEngine, StatsSnapshot};
use adaptmap_store::RecordStore;
use serde::Serialize;
use std::time::Instant;
use tracing::warn;

/// Result of a history load.
#[derive(Debug, Serialize)]
pub struct LoadReport {
    /// Days written.
    pub days: u32,
    /// Transactions written.
    pub total: u64,
    /// Time spent writing, in milliseconds.
    pub write_ms: f64,
    /// Time spent reading everything back, in milliseconds.
    pub read_ms: f64,
    /// Per-day read-back results.
    pub read_back: Vec<DayReport>,
    /// Splits committed during the run.
    pub splits: u64,
    /// Conflict retries during the run.
    pub conflict_retries: u64,
}

/// Read-back of one day.
#[derive(Debug, Serialize)]
pub struct DayReport {
    /// Base key of the day.
    pub base_key: String,
    /// Entries read, if the map was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
    /// Error text, if the read failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the load-history command.
pub fn run<S: RecordStore>(
    engine: &AdaptiveMapEngine<S>,
    spec: &HistorySpec,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    engine.truncate()?;

    let started = Instant::now();
    let base_keys = history::load(engine, spec)?;
    let write_ms = started.elapsed().as_secs_f64() * 1000.0;

    let started = Instant::now();
    let refs: Vec<&str> = base_keys.iter().map(String::as_str).collect();
    let results = AdaptiveMap::get_all(engine, None, &refs);
    let read_ms = started.elapsed().as_secs_f64() * 1000.0;

    let read_back = base_keys
        .iter()
        .zip(results)
        .map(|(base_key, result)| match result {
            Ok(map) => DayReport {
                base_key: base_key.clone(),
                entries: map.map(|m| m.len()),
                error: None,
            },
            Err(e) => {
                warn!(base_key = %base_key, error = %e, "read-back failed");
                DayReport {
                    base_key: base_key.clone(),
                    entries: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    let StatsSnapshot {
        splits,
        conflict_retries,
        ..
    } = engine.stats().snapshot();
    let report = LoadReport {
        days: spec.days,
        total: spec.total(),
        write_ms,
        read_ms,
        read_back,
        splits,
        conflict_retries,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }

    Ok(())
}

fn print_text_output(report: &LoadReport) {
    println!(
        "Saved {} days records with {} total entries in {:.1}ms",
        report.days, report.total, report.write_ms
    );
    println!(
        "Retrieved {} days records in {:.1}ms",
        report.read_back.len(),
        report.read_ms
    );
    println!();
    for day in &report.read_back {
        match (&day.entries, &day.error) {
            (Some(entries), _) => println!("  {:<24} {entries}", day.base_key),
            (None, Some(error)) => println!("  {:<24} error: {error}", day.base_key),
            (None, None) => println!("  {:<24} not found", day.base_key),
        }
    }
    println!();
    println!("Splits:           {}", report.splits);
    println!("Conflict retries: {}", report.conflict_retries);
}
