//! Per-call store policies.

use std::time::Duration;

/// How a map write treats an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapWriteMode {
    /// Create the entry or replace its value.
    #[default]
    Upsert,
    /// Fail with `EntryExists` if the entry is present.
    CreateOnly,
    /// Fail with `EntryNotFound` if the entry is absent.
    UpdateOnly,
}

/// Write behaviour of map operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapPolicy {
    /// Treatment of existing entries.
    pub write_mode: MapWriteMode,
}

impl MapPolicy {
    /// Creates a map policy with the given write mode.
    pub const fn new(write_mode: MapWriteMode) -> Self {
        Self { write_mode }
    }
}

/// Optimistic-concurrency condition attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationPolicy {
    /// Write unconditionally.
    #[default]
    None,
    /// Write only if the stored generation equals this value.
    /// A missing record has generation 0.
    ExpectEqual(u32),
}

/// How a whole-record write treats an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordExistsAction {
    /// Create the record or merge bins into it.
    #[default]
    Upsert,
    /// Fail with `RecordExists` if the record is present.
    CreateOnly,
}

/// Policy for read calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadPolicy {
    /// Maximum duration of the call. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ReadPolicy {
    /// Creates a read policy with a timeout.
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Policy for write calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WritePolicy {
    /// Generation condition.
    pub generation: GenerationPolicy,
    /// Existing-record behaviour for whole-record writes.
    pub exists: RecordExistsAction,
    /// Existing-entry behaviour for map writes.
    pub map: MapPolicy,
    /// Maximum duration of the call. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl WritePolicy {
    /// Creates an unconditional upsert policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the stored generation to equal `generation`.
    #[must_use]
    pub const fn expect_generation(mut self, generation: u32) -> Self {
        self.generation = GenerationPolicy::ExpectEqual(generation);
        self
    }

    /// Requires the record not to exist.
    #[must_use]
    pub const fn create_only(mut self) -> Self {
        self.exists = RecordExistsAction::CreateOnly;
        self
    }

    /// Sets the map write behaviour.
    #[must_use]
    pub const fn with_map_policy(mut self, map: MapPolicy) -> Self {
        self.map = map;
        self
    }

    /// Sets the call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}
