//! Engine configuration.

use crate::error::{CoreError, CoreResult};
use crate::key::AddressingMode;
use crate::segment::RESERVED_BINS;
use crate::split::SplitStrategy;
use adaptmap_store::MapPolicy;
use std::time::Duration;

/// Default number of entries a segment may hold before it splits.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 100;

/// Configuration for an [`crate::AdaptiveMapEngine`].
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Store namespace holding every segment record.
    pub namespace: String,

    /// Store set holding every segment record.
    pub set: String,

    /// Name of the map bin that holds segment entries.
    pub bin: String,

    /// Map write behaviour used when a put passes no policy.
    pub map_policy: MapPolicy,

    /// How physical record keys are derived.
    pub addressing: AddressingMode,

    /// Entries per segment before a split is triggered.
    pub split_threshold: usize,

    /// Where split boundaries are placed.
    pub split_strategy: SplitStrategy,

    /// Retry behaviour for optimistic-concurrency conflicts.
    pub retry: RetryConfig,

    /// Timeout applied to each store call.
    pub call_timeout: Option<Duration>,

    /// Deadline for a whole logical operation, including retries.
    pub operation_timeout: Option<Duration>,

    /// Maximum base keys fetched concurrently by `get_all`.
    pub max_batch_concurrency: usize,

    /// Maximum base keys whose segment hints are cached (value-key mode).
    pub hint_capacity: usize,
}

impl MapConfig {
    /// Creates a configuration with default values.
    pub fn new(namespace: impl Into<String>, set: impl Into<String>, bin: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            bin: bin.into(),
            map_policy: MapPolicy::default(),
            addressing: AddressingMode::ValueKey,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            split_strategy: SplitStrategy::AppendForward,
            retry: RetryConfig::default(),
            call_timeout: Some(Duration::from_secs(1)),
            operation_timeout: Some(Duration::from_secs(10)),
            max_batch_concurrency: 8,
            hint_capacity: 4096,
        }
    }

    /// Sets the default map policy.
    #[must_use]
    pub fn with_map_policy(mut self, policy: MapPolicy) -> Self {
        self.map_policy = policy;
        self
    }

    /// Sets the addressing mode.
    #[must_use]
    pub fn with_addressing(mut self, mode: AddressingMode) -> Self {
        self.addressing = mode;
        self
    }

    /// Selects digest-key addressing when `digest` is true.
    #[must_use]
    pub fn with_digest_keys(self, digest: bool) -> Self {
        self.with_addressing(if digest {
            AddressingMode::DigestKey
        } else {
            AddressingMode::ValueKey
        })
    }

    /// Sets the split threshold.
    #[must_use]
    pub fn with_split_threshold(mut self, threshold: usize) -> Self {
        self.split_threshold = threshold;
        self
    }

    /// Sets the split strategy.
    #[must_use]
    pub fn with_split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.split_strategy = strategy;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-call store timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the per-operation deadline.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the `get_all` fan-out width.
    #[must_use]
    pub fn with_max_batch_concurrency(mut self, width: usize) -> Self {
        self.max_batch_concurrency = width;
        self
    }

    /// Checks the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` describing the first problem found.
    pub fn validate(&self) -> CoreResult<()> {
        if self.namespace.is_empty() || self.set.is_empty() {
            return Err(CoreError::invalid_argument("namespace and set must not be empty"));
        }
        if self.bin.is_empty() {
            return Err(CoreError::invalid_argument("bin name must not be empty"));
        }
        if RESERVED_BINS.contains(&self.bin.as_str()) {
            return Err(CoreError::invalid_argument(format!(
                "bin name '{}' is reserved for segment metadata",
                self.bin
            )));
        }
        if self.split_threshold == 0 {
            return Err(CoreError::invalid_argument("split threshold must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::invalid_argument("retry attempts must be positive"));
        }
        if self.max_batch_concurrency == 0 {
            return Err(CoreError::invalid_argument("batch concurrency must be positive"));
        }
        Ok(())
    }
}

/// Configuration for conflict retry behaviour.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_micros(200),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before retry `attempt` (0 = first try).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * rand::random::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Per-call policy for `get_all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Overrides the operation deadline for each base key.
    pub timeout: Option<Duration>,
    /// Overrides the configured fan-out width.
    pub max_concurrency: Option<usize>,
}

impl BatchPolicy {
    /// Sets the per-key deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the fan-out width.
    #[must_use]
    pub const fn with_max_concurrency(mut self, width: usize) -> Self {
        self.max_concurrency = Some(width);
        self
    }
}
