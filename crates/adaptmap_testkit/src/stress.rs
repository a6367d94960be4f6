//! Stress tests for AdaptMap.
//!
//! These drivers run many writers and readers against the same logical
//! maps at once, so that splits race with each other and with reads.

use adaptmap_core::AdaptiveMap;
use adaptmap_store::{SubKey, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Puts per writer thread.
    pub operations: usize,
    /// Number of writer threads.
    pub threads: usize,
    /// Number of base keys the writers share.
    pub base_keys: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 500,
            threads: 4,
            base_keys: 2,
        }
    }
}

impl StressConfig {
    /// Base keys used by the drivers.
    pub fn base_key_names(&self) -> Vec<String> {
        (0..self.base_keys).map(|i| format!("stress:{i}")).collect()
    }
}

/// Sub-key written by `thread` on its `i`th put.
///
/// Threads interleave, so every thread writes into every segment.
pub fn interleaved_sub_key(config: &StressConfig, thread: usize, i: usize) -> SubKey {
    (i * config.threads + thread) as SubKey
}

/// Runs concurrent writers that put disjoint sub-keys into shared maps.
///
/// Afterwards the maps hold `operations * threads` entries between them.
pub fn stress_concurrent_writes<M>(map: Arc<M>, config: &StressConfig) -> StressTestResult
where
    M: AdaptiveMap + ?Sized + 'static,
{
    let base_keys = Arc::new(config.base_key_names());
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let map = Arc::clone(&map);
            let base_keys = Arc::clone(&base_keys);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                for i in 0..config.operations {
                    let sub_key = interleaved_sub_key(&config, t, i);
                    let base_key = &base_keys[i % base_keys.len()];
                    match map.put(base_key, sub_key, None, Value::Int(sub_key)) {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs batch readers while writers split the maps underneath them.
///
/// Every map is first seeded with the even sub-keys below
/// `2 * operations`; writers then fill in the odd ones, which forces
/// splits throughout the chain. A read counts as failed if it misses any
/// seeded entry or sees a value that was never written. Failed writer puts
/// are counted too.
pub fn stress_reads_during_splits<M>(map: Arc<M>, config: &StressConfig) -> StressTestResult
where
    M: AdaptiveMap + ?Sized + 'static,
{
    let base_keys = Arc::new(config.base_key_names());
    let seeded = config.operations as SubKey;
    for base_key in base_keys.iter() {
        for k in 0..seeded {
            map.put(base_key, k * 2, None, Value::Int(k * 2))
                .expect("Failed to seed map");
        }
    }

    let writers_done = Arc::new(AtomicUsize::new(0));
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let map = Arc::clone(&map);
            let base_keys = Arc::clone(&base_keys);
            let writers_done = Arc::clone(&writers_done);
            let failed = Arc::clone(&failed);
            let threads = config.threads as SubKey;

            thread::spawn(move || {
                let mut k = t as SubKey;
                while k < seeded {
                    for base_key in base_keys.iter() {
                        if map
                            .put(base_key, k * 2 + 1, None, Value::Int(k * 2 + 1))
                            .is_err()
                        {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    k += threads;
                }
                writers_done.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    {
        let map = Arc::clone(&map);
        let base_keys = Arc::clone(&base_keys);
        let writers_done = Arc::clone(&writers_done);
        let successful = Arc::clone(&successful);
        let failed = Arc::clone(&failed);
        let writers = config.threads;

        handles.push(thread::spawn(move || {
            let keys: Vec<&str> = base_keys.iter().map(String::as_str).collect();
            loop {
                let finished = writers_done.load(Ordering::SeqCst) == writers;
                for result in map.get_all(None, &keys) {
                    let complete = result.ok().flatten().is_some_and(|entries| {
                        (0..seeded).all(|k| entries.contains_key(&(k * 2)))
                            && entries.iter().all(|(k, v)| v.as_int() == Some(*k))
                    });
                    if complete {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                if finished {
                    break;
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
