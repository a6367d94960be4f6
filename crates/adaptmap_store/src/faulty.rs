//! Fault-injecting store wrapper.
//!
//! Wraps any [`RecordStore`] and perturbs calls on demand:
//!
//! - fixed latency per call, turned into [`StoreError::Timeout`] when it
//!   exceeds the call's policy timeout
//! - transport failures for selected records, or for every record
//! - a budget of forced generation conflicts on conditional writes
//! - a one-shot hook that runs just before the next conditional write,
//!   used to interleave a competing writer deterministically

use crate::error::{StoreError, StoreResult};
use crate::policy::{GenerationPolicy, ReadPolicy, RecordExistsAction, WritePolicy};
use crate::record::{Record, RecordKey, SubKey, Value};
use crate::store::RecordStore;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

type Hook = Box<dyn FnOnce() + Send>;

/// A store wrapper that injects latency and failures.
///
/// # Example
///
/// ```rust
/// use adaptmap_store::{FaultInjectingStore, InMemoryStore, ReadPolicy, RecordKey, RecordStore};
///
/// let store = FaultInjectingStore::new(InMemoryStore::new());
/// let key = RecordKey::text("test", "demo", "k");
/// store.fail_key(key.clone());
/// assert!(store.get(&key, &ReadPolicy::default()).is_err());
/// ```
pub struct FaultInjectingStore<S> {
    inner: S,
    latency: RwLock<Duration>,
    offline: AtomicBool,
    failing: RwLock<HashSet<RecordKey>>,
    forced_conflicts: AtomicU32,
    hook: Mutex<Option<Hook>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl<S: RecordStore> FaultInjectingStore<S> {
    /// Wraps `inner` with no faults enabled.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            latency: RwLock::new(Duration::ZERO),
            offline: AtomicBool::new(false),
            failing: RwLock::new(HashSet::new()),
            forced_conflicts: AtomicU32::new(0),
            hook: Mutex::new(None),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Sets the latency added to every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Makes every call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes calls touching `key` fail with [`StoreError::Unavailable`].
    pub fn fail_key(&self, key: RecordKey) {
        self.failing.write().insert(key);
    }

    /// Clears per-key failures.
    pub fn heal_keys(&self) {
        self.failing.write().clear();
    }

    /// Makes the next `count` conditional writes fail with a generation
    /// mismatch without being applied.
    pub fn force_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// Runs `hook` once, immediately before the next conditional write.
    pub fn before_next_conditional_write(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    /// Number of read calls seen (batch reads count once per key).
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of write calls seen.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn delay(&self, timeout: Option<Duration>) -> StoreResult<()> {
        let latency = *self.latency.read();
        if latency.is_zero() {
            return Ok(());
        }
        match timeout {
            Some(limit) if latency > limit => {
                std::thread::sleep(limit);
                Err(StoreError::Timeout(limit))
            }
            _ => {
                std::thread::sleep(latency);
                Ok(())
            }
        }
    }

    fn check_reachable(&self, key: &RecordKey) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        if self.failing.read().contains(key) {
            return Err(StoreError::Unavailable(format!("{key} unreachable")));
        }
        Ok(())
    }

    fn before_write(&self, key: &RecordKey, policy: &WritePolicy) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.check_reachable(key)?;
        self.delay(policy.timeout)?;

        let conditional = matches!(policy.generation, GenerationPolicy::ExpectEqual(_))
            || policy.exists == RecordExistsAction::CreateOnly;
        if !conditional {
            return Ok(());
        }

        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }

        let forced = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            let expected = match policy.generation {
                GenerationPolicy::ExpectEqual(generation) => generation,
                GenerationPolicy::None => 0,
            };
            return Err(StoreError::GenerationMismatch {
                key: key.clone(),
                expected,
                actual: expected.wrapping_add(1),
            });
        }
        Ok(())
    }
}

impl<S: RecordStore> RecordStore for FaultInjectingStore<S> {
    fn get(&self, key: &RecordKey, policy: &ReadPolicy) -> StoreResult<Option<Record>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.check_reachable(key)?;
        self.delay(policy.timeout)?;
        self.inner.get(key, policy)
    }

    fn put_map_entry(
        &self,
        key: &RecordKey,
        bin: &str,
        sub_key: SubKey,
        value: Value,
        policy: &WritePolicy,
    ) -> StoreResult<u32> {
        self.before_write(key, policy)?;
        self.inner.put_map_entry(key, bin, sub_key, value, policy)
    }

    fn put_record(
        &self,
        key: &RecordKey,
        bins: Vec<(String, Value)>,
        policy: &WritePolicy,
    ) -> StoreResult<u32> {
        self.before_write(key, policy)?;
        self.inner.put_record(key, bins, policy)
    }

    fn delete(&self, key: &RecordKey, policy: &WritePolicy) -> StoreResult<bool> {
        self.before_write(key, policy)?;
        self.inner.delete(key, policy)
    }

    fn increment(
        &self,
        key: &RecordKey,
        bin: &str,
        delta: i64,
        policy: &WritePolicy,
    ) -> StoreResult<i64> {
        self.before_write(key, policy)?;
        self.inner.increment(key, bin, delta, policy)
    }

    fn batch_get(
        &self,
        keys: &[RecordKey],
        policy: &ReadPolicy,
    ) -> Vec<StoreResult<Option<Record>>> {
        self.reads.fetch_add(keys.len() as u64, Ordering::Relaxed);
        if let Err(err) = self.delay(policy.timeout) {
            let limit = match err {
                StoreError::Timeout(limit) => limit,
                _ => Duration::ZERO,
            };
            return keys.iter().map(|_| Err(StoreError::Timeout(limit))).collect();
        }

        let reachable: Vec<bool> = keys
            .iter()
            .map(|key| self.check_reachable(key).is_ok())
            .collect();
        let wanted: Vec<RecordKey> = keys
            .iter()
            .zip(&reachable)
            .filter(|(_, ok)| **ok)
            .map(|(key, _)| key.clone())
            .collect();
        let mut fetched = self.inner.batch_get(&wanted, policy).into_iter();

        keys.iter()
            .zip(reachable)
            .map(|(key, ok)| {
                if ok {
                    fetched
                        .next()
                        .unwrap_or_else(|| Err(StoreError::Unavailable("short batch".into())))
                } else {
                    self.check_reachable(key).map(|()| None)
                }
            })
            .collect()
    }

    fn truncate(&self, namespace: &str, set: &str) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        self.inner.truncate(namespace, set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    fn key(id: &str) -> RecordKey {
        RecordKey::text("test", "maps", id)
    }

    #[test]
    fn failing_key_is_isolated() {
        let store = FaultInjectingStore::new(InMemoryStore::new());
        let policy = WritePolicy::default();
        store.put_map_entry(&key("a"), "m", 1, Value::Int(1), &policy).unwrap();
        store.put_map_entry(&key("b"), "m", 1, Value::Int(1), &policy).unwrap();
        store.fail_key(key("a"));

        let results = store.batch_get(&[key("a"), key("b"), key("c")], &ReadPolicy::default());
        assert!(matches!(results[0], Err(StoreError::Unavailable(_))));
        assert!(results[1].as_ref().unwrap().is_some());
        assert!(results[2].as_ref().unwrap().is_none());

        store.heal_keys();
        assert!(store.get(&key("a"), &ReadPolicy::default()).unwrap().is_some());
    }

    #[test]
    fn offline_fails_everything() {
        let store = FaultInjectingStore::new(InMemoryStore::new());
        store.set_offline(true);
        assert!(store.get(&key("a"), &ReadPolicy::default()).unwrap_err().is_unavailable());
        assert!(store.truncate("test", "maps").is_err());
    }

    #[test]
    fn latency_beyond_timeout_times_out() {
        let store = FaultInjectingStore::new(InMemoryStore::new());
        store.set_latency(Duration::from_millis(30));
        let policy = ReadPolicy::with_timeout(Duration::from_millis(5));
        assert!(matches!(store.get(&key("a"), &policy), Err(StoreError::Timeout(_))));
        // Without a timeout the call just waits
        assert!(store.get(&key("a"), &ReadPolicy::default()).unwrap().is_none());
    }

    #[test]
    fn forced_conflicts_only_hit_conditional_writes() {
        let store = FaultInjectingStore::new(InMemoryStore::new());
        store.force_conflicts(1);

        // Unconditional write is unaffected
        store
            .put_map_entry(&key("a"), "m", 1, Value::Int(1), &WritePolicy::default())
            .unwrap();

        let conditional = WritePolicy::new().expect_generation(1);
        let err = store
            .put_map_entry(&key("a"), "m", 2, Value::Int(2), &conditional)
            .unwrap_err();
        assert!(err.is_conflict());
        store
            .put_map_entry(&key("a"), "m", 2, Value::Int(2), &conditional)
            .unwrap();
        assert_eq!(store.write_count(), 3);
    }

    #[test]
    fn hook_runs_once_before_conditional_write() {
        use std::sync::Arc;

        let store = Arc::new(FaultInjectingStore::new(InMemoryStore::new()));
        store
            .put_map_entry(&key("a"), "m", 1, Value::Int(1), &WritePolicy::default())
            .unwrap();

        let competitor = Arc::clone(&store);
        store.before_next_conditional_write(move || {
            competitor
                .put_map_entry(&key("a"), "m", 9, Value::Int(9), &WritePolicy::default())
                .unwrap();
        });

        let conditional = WritePolicy::new().expect_generation(1);
        let err = store
            .put_map_entry(&key("a"), "m", 2, Value::Int(2), &conditional)
            .unwrap_err();
        assert!(err.is_conflict());
        let generation = store
            .put_map_entry(&key("a"), "m", 2, Value::Int(2), &WritePolicy::new().expect_generation(2))
            .unwrap();
        assert_eq!(generation, 3);
    }
}
