//! Deadlines for logical operations.

use crate::error::{CoreError, CoreResult};
use adaptmap_store::{ReadPolicy, WritePolicy};
use std::time::{Duration, Instant};

/// Time budget shared by every store call of one logical operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    limit: Option<Duration>,
    call_timeout: Option<Duration>,
}

impl Deadline {
    pub(crate) fn new(limit: Option<Duration>, call_timeout: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
            call_timeout,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn remaining(&self) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(self.elapsed()))
    }

    /// Fails with `Timeout` once the budget is spent.
    pub(crate) fn check(&self, base_key: &str) -> CoreResult<()> {
        match self.remaining() {
            Some(left) if left.is_zero() => Err(CoreError::Timeout {
                base_key: base_key.to_owned(),
                segment: None,
                elapsed: self.elapsed(),
                source: None,
            }),
            _ => Ok(()),
        }
    }

    /// Sleeps for `delay`, capped by the remaining budget.
    pub(crate) fn sleep(&self, delay: Duration) {
        let delay = self.remaining().map_or(delay, |left| delay.min(left));
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    /// Timeout for the next store call: the call timeout capped by the
    /// remaining budget.
    fn call_timeout(&self) -> Option<Duration> {
        match (self.call_timeout, self.remaining()) {
            (Some(call), Some(left)) => Some(call.min(left)),
            (call, left) => call.or(left),
        }
    }

    pub(crate) fn read_policy(&self) -> ReadPolicy {
        ReadPolicy {
            timeout: self.call_timeout(),
        }
    }

    pub(crate) fn write_policy(&self) -> WritePolicy {
        WritePolicy::new().with_timeout(self.call_timeout())
    }
}
