//! The sharding engine.

use crate::config::{BatchPolicy, MapConfig};
use crate::deadline::Deadline;
use crate::error::{CoreError, CoreResult};
use crate::key::{check_base_key, KeyCodec};
use crate::segment::{ChainLink, Located, SegmentIndex, SegmentInfo, SegmentRecord};
use crate::split::SplitPolicy;
use crate::stats::EngineStats;
use adaptmap_store::{MapPolicy, MapWriteMode, RecordStore, SubKey, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace, warn};

/// Steps of a single put that made structural progress (a split, or help
/// with someone else's) before the write could land.
const MAX_PROGRESS_STEPS: u32 = 64;

/// Outcome of one attempt of a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The entry was written.
    Done,
    /// Lost an optimistic race; back off and retry.
    Conflict,
    /// Changed the segment layout; retry at once.
    Progress,
}

/// Engine that stores each logical map as a chain of bounded segments.
///
/// The engine is `Send + Sync` and is meant to be shared across threads.
/// Several engines, in one process or many, may operate on the same store
/// at once: all coordination happens through generation-checked writes.
///
/// ```rust
/// use adaptmap_core::{AdaptiveMapEngine, MapConfig};
/// use adaptmap_store::{InMemoryStore, Value};
/// use std::sync::Arc;
///
/// let store = Arc::new(InMemoryStore::new());
/// let config = MapConfig::new("test", "txns", "mapBin").with_split_threshold(2);
/// let engine = AdaptiveMapEngine::new(store, config).unwrap();
///
/// for day in 0..5 {
///     engine.put("customer-1", day, None, Value::Int(day * 10)).unwrap();
/// }
/// assert_eq!(engine.get("customer-1", 3).unwrap(), Value::Int(30));
/// assert!(engine.segments("customer-1").unwrap().len() > 1);
/// ```
pub struct AdaptiveMapEngine<S> {
    store: Arc<S>,
    config: MapConfig,
    split: SplitPolicy,
    index: SegmentIndex<S>,
    stats: Arc<EngineStats>,
}

impl<S: RecordStore> AdaptiveMapEngine<S> {
    /// Creates an engine over `store`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration is invalid.
    pub fn new(store: Arc<S>, config: MapConfig) -> CoreResult<Self> {
        config.validate()?;
        let stats = Arc::new(EngineStats::new());
        let codec = KeyCodec::new(&config.namespace, &config.set, config.addressing);
        let index = SegmentIndex::new(
            Arc::clone(&store),
            codec,
            &config.bin,
            config.hint_capacity,
            Arc::clone(&stats),
        );
        Ok(Self {
            split: SplitPolicy::new(config.split_threshold, config.split_strategy),
            store,
            config,
            index,
            stats,
        })
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Returns the engine statistics.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn deadline(&self, limit: Option<std::time::Duration>) -> Deadline {
        Deadline::new(limit, self.config.call_timeout)
    }

    /// Counts failures other than not-found.
    fn observe<T>(&self, result: CoreResult<T>) -> CoreResult<T> {
        if let Err(e) = &result {
            if !e.is_not_found() {
                self.stats.record_error();
            }
        }
        result
    }

    /// Reads the value stored under `sub_key`.
    ///
    /// # Errors
    ///
    /// - `MapNotFound` if nothing was ever written under `base_key`
    /// - `EntryNotFound` if the map exists but holds no such entry
    /// - `Timeout`, `StoreUnavailable` or `Corrupted` on failure
    pub fn get(&self, base_key: &str, sub_key: SubKey) -> CoreResult<Value> {
        self.stats.record_get();
        let result = self.get_inner(base_key, sub_key);
        self.observe(result)
    }

    fn get_inner(&self, base_key: &str, sub_key: SubKey) -> CoreResult<Value> {
        check_base_key(base_key)?;
        let deadline = self.deadline(self.config.operation_timeout);
        let located = self
            .index
            .locate(base_key, sub_key, &deadline)?
            .ok_or_else(|| CoreError::map_not_found(base_key))?;
        trace!(base_key, sub_key, segment = located.ordinal(), "get");
        located
            .value(sub_key)
            .cloned()
            .ok_or_else(|| CoreError::EntryNotFound {
                base_key: base_key.to_owned(),
                sub_key,
                segment: located.ordinal(),
            })
    }

    /// Writes `value` under `sub_key`, creating the map on first use and
    /// splitting full segments as needed.
    ///
    /// `policy` overrides the configured map write mode for this call.
    ///
    /// # Errors
    ///
    /// - `EntryExists` / `EntryNotFound` when the write mode rejects the entry
    /// - `ConflictRetryExhausted` if concurrent writers kept winning
    /// - `Timeout`, `StoreUnavailable` or `Corrupted` on failure
    pub fn put(
        &self,
        base_key: &str,
        sub_key: SubKey,
        policy: Option<&MapPolicy>,
        value: Value,
    ) -> CoreResult<()> {
        self.stats.record_put();
        let result = self.put_inner(base_key, sub_key, policy, value);
        self.observe(result)
    }

    fn put_inner(
        &self,
        base_key: &str,
        sub_key: SubKey,
        policy: Option<&MapPolicy>,
        value: Value,
    ) -> CoreResult<()> {
        check_base_key(base_key)?;
        let policy = policy.copied().unwrap_or(self.config.map_policy);
        let deadline = self.deadline(self.config.operation_timeout);
        let mut conflicts = 0u32;
        let mut progress = 0u32;

        loop {
            deadline.check(base_key)?;
            match self.put_step(base_key, sub_key, &policy, &value, &deadline)? {
                Step::Done => {
                    trace!(base_key, sub_key, conflicts, "put");
                    return Ok(());
                }
                Step::Progress => {
                    progress += 1;
                    if progress > MAX_PROGRESS_STEPS {
                        warn!(base_key, sub_key, progress, "put kept restructuring");
                        return Err(CoreError::ConflictRetryExhausted {
                            base_key: base_key.to_owned(),
                            attempts: conflicts + progress,
                        });
                    }
                }
                Step::Conflict => {
                    conflicts += 1;
                    if conflicts >= self.config.retry.max_attempts {
                        warn!(base_key, sub_key, conflicts, "put gave up after conflicts");
                        return Err(CoreError::ConflictRetryExhausted {
                            base_key: base_key.to_owned(),
                            attempts: conflicts,
                        });
                    }
                    self.stats.record_conflict_retry();
                    deadline.sleep(self.config.retry.delay_for_attempt(conflicts));
                }
            }
        }
    }

    fn put_step(
        &self,
        base_key: &str,
        sub_key: SubKey,
        policy: &MapPolicy,
        value: &Value,
        deadline: &Deadline,
    ) -> CoreResult<Step> {
        let segment = match self.index.locate(base_key, sub_key, deadline)? {
            None => {
                if policy.write_mode == MapWriteMode::UpdateOnly {
                    return Err(CoreError::map_not_found(base_key));
                }
                let created = self
                    .index
                    .create_root(base_key, sub_key, value.clone(), deadline)?;
                return Ok(if created { Step::Done } else { Step::Conflict });
            }
            Some(Located::Migrating(parent)) => {
                self.assist(base_key, &parent, deadline)?;
                return Ok(Step::Progress);
            }
            Some(Located::Segment(segment)) if segment.is_splitting() => {
                self.assist(base_key, &segment, deadline)?;
                return Ok(Step::Progress);
            }
            Some(Located::Segment(segment)) => segment,
        };

        let exists = segment.entries.contains_key(&sub_key);
        match policy.write_mode {
            MapWriteMode::CreateOnly if exists => {
                return Err(CoreError::EntryExists {
                    base_key: base_key.to_owned(),
                    sub_key,
                });
            }
            MapWriteMode::UpdateOnly if !exists => {
                return Err(CoreError::EntryNotFound {
                    base_key: base_key.to_owned(),
                    sub_key,
                    segment: segment.ordinal,
                });
            }
            _ => {}
        }

        if !exists && self.split.should_split(segment.entry_count()) {
            return self.split_segment(base_key, segment, sub_key, deadline);
        }

        let key = self.index.codec().segment_key(base_key, segment.ordinal)?;
        let write = deadline
            .write_policy()
            .expect_generation(segment.generation)
            .with_map_policy(*policy);
        match self
            .store
            .put_map_entry(&key, &self.config.bin, sub_key, value.clone(), &write)
        {
            Ok(_) => Ok(Step::Done),
            Err(e) if e.is_conflict() => Ok(Step::Conflict),
            Err(e) => Err(CoreError::from_store(
                base_key,
                Some(segment.ordinal),
                sub_key,
                deadline.elapsed(),
                e,
            )),
        }
    }

    /// Finishes a split some other writer committed.
    fn assist(&self, base_key: &str, parent: &SegmentRecord, deadline: &Deadline) -> CoreResult<()> {
        debug!(base_key, segment = parent.ordinal, "completing in-flight split");
        self.stats.record_split_assist();
        self.index.complete_split(base_key, parent, deadline)
    }

    /// Splits a full segment so that `sub_key` has room.
    fn split_segment(
        &self,
        base_key: &str,
        segment: SegmentRecord,
        sub_key: SubKey,
        deadline: &Deadline,
    ) -> CoreResult<Step> {
        let successor = self.index.allocate_ordinal(base_key, deadline)?;

        // Allocation writes to the root, so a root about to split must be
        // read again at its new generation
        let segment = if segment.ordinal == 0 {
            let Some(current) = self.index.read_segment(base_key, 0, deadline)? else {
                return Ok(Step::Conflict);
            };
            let unchanged = current.hi == segment.hi
                && current.pending.is_none()
                && current.entries == segment.entries;
            if !unchanged {
                return Ok(Step::Conflict);
            }
            current
        } else {
            segment
        };

        let boundary = self.split.choose_boundary(&segment, sub_key);
        debug!(
            base_key,
            segment = segment.ordinal,
            successor,
            boundary,
            entries = segment.entry_count(),
            "splitting segment"
        );
        if self
            .index
            .record_split(base_key, &segment, boundary, successor, deadline)?
        {
            Ok(Step::Progress)
        } else {
            Ok(Step::Conflict)
        }
    }

    /// Reads whole maps for many base keys.
    ///
    /// Base keys are read in parallel, at most `max_concurrency` at a time.
    /// Each base key gets its own result in input order: `Ok(None)` if the
    /// map does not exist, or the error that stopped it being read. One
    /// failing base key never affects the others.
    pub fn get_all(
        &self,
        policy: Option<&BatchPolicy>,
        base_keys: &[&str],
    ) -> Vec<CoreResult<Option<BTreeMap<SubKey, Value>>>> {
        let policy = policy.copied().unwrap_or_default();
        let width = policy
            .max_concurrency
            .unwrap_or(self.config.max_batch_concurrency)
            .max(1);
        let limit = policy.timeout.or(self.config.operation_timeout);
        debug!(keys = base_keys.len(), width, "get_all");

        let mut results = Vec::with_capacity(base_keys.len());
        for chunk in base_keys.chunks(width) {
            if let [base_key] = chunk {
                results.push(self.read_map(base_key, limit));
                continue;
            }
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|base_key| scope.spawn(move || self.read_map(base_key, limit)))
                    .collect();
                for handle in handles {
                    results.push(
                        handle
                            .join()
                            .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
                    );
                }
            });
        }
        results
    }

    /// Reads one map of a batch. Each key gets its own deadline.
    fn read_map(
        &self,
        base_key: &str,
        limit: Option<std::time::Duration>,
    ) -> CoreResult<Option<BTreeMap<SubKey, Value>>> {
        self.stats.record_batch_key();
        let deadline = self.deadline(limit);
        let result = check_base_key(base_key)
            .and_then(|()| self.index.chain(base_key, &deadline))
            .map(|links| links.map(|links| merge(&links)));
        if let Err(e) = &result {
            debug!(base_key, error = %e, "batch read failed");
        }
        self.observe(result)
    }

    /// Reads entries with `from <= sub_key < to`.
    ///
    /// # Errors
    ///
    /// Returns `MapNotFound` if the map does not exist and
    /// `InvalidArgument` if the range is empty.
    pub fn get_range(
        &self,
        base_key: &str,
        from: SubKey,
        to: SubKey,
    ) -> CoreResult<BTreeMap<SubKey, Value>> {
        check_base_key(base_key)?;
        if from >= to {
            return Err(CoreError::invalid_argument(format!(
                "empty range [{from}, {to})"
            )));
        }
        let deadline = self.deadline(self.config.operation_timeout);
        let links = self
            .index
            .range(base_key, from, to, &deadline)?
            .ok_or_else(|| CoreError::map_not_found(base_key))?;
        let mut entries = merge(&links);
        entries.retain(|k, _| (from..to).contains(k));
        Ok(entries)
    }

    /// Describes every segment of a map in range order.
    ///
    /// # Errors
    ///
    /// Returns `MapNotFound` if the map does not exist.
    pub fn segments(&self, base_key: &str) -> CoreResult<Vec<SegmentInfo>> {
        check_base_key(base_key)?;
        let deadline = self.deadline(self.config.operation_timeout);
        let links = self
            .index
            .chain(base_key, &deadline)?
            .ok_or_else(|| CoreError::map_not_found(base_key))?;

        let codec = self.index.codec();
        let mut infos = Vec::with_capacity(links.len());
        for link in &links {
            let segment = &link.segment;
            infos.push(SegmentInfo {
                ordinal: segment.ordinal,
                lower: segment.lo,
                upper: segment.hi,
                physical_key: codec.segment_key(base_key, segment.ordinal)?,
                entry_count: segment.entry_count(),
                splitting: segment.is_splitting(),
            });
            if let (true, Some(next), Some(lower)) =
                (link.serves_successor, segment.next, segment.hi)
            {
                infos.push(SegmentInfo {
                    ordinal: next,
                    lower,
                    upper: segment.pending.and_then(|p| p.hi),
                    physical_key: codec.segment_key(base_key, next)?,
                    entry_count: segment.migrating_entries().count(),
                    splitting: true,
                });
            }
        }
        Ok(infos)
    }

    /// Removes every record in the configured namespace and set.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn truncate(&self) -> CoreResult<()> {
        self.index.forget_all();
        self.store
            .truncate(&self.config.namespace, &self.config.set)?;
        debug!(namespace = %self.config.namespace, set = %self.config.set, "truncated");
        Ok(())
    }
}

/// Concatenates the live ranges of a chain.
fn merge(links: &[ChainLink]) -> BTreeMap<SubKey, Value> {
    let mut entries = BTreeMap::new();
    for link in links {
        let segment = &link.segment;
        entries.extend(segment.live_entries().map(|(k, v)| (*k, v.clone())));
        if link.serves_successor {
            entries.extend(segment.migrating_entries().map(|(k, v)| (*k, v.clone())));
        }
    }
    entries
}
