//! Retry policy for version conflicts
//!
//! An append claims `latest + 1` with a compare-and-insert. When another
//! writer sharing the same database file claims it first, the insert reports
//! a conflict and the whole read-modify-write is retried after a backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use timetravel_core::{OpContext, Result};
use tracing::warn;

/// Exponential backoff settings for conflicting appends
///
/// # Example
/// ```ignore
/// let policy = RetryPolicy::new().with_max_retries(5).with_max_delay_ms(200);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        // Cap the shift to prevent overflow (1 << 63 is the max for u64)
        let shift = attempt.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Run `op`, retrying while it fails with a version conflict
    ///
    /// The last conflict is returned once retries are exhausted. Backoff never
    /// sleeps past the context deadline.
    pub fn run<T>(&self, ctx: &OpContext, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_conflict() && attempt < self.max_retries => {
                    let mut delay = self.calculate_delay(attempt);
                    if let Some(remaining) = ctx.remaining() {
                        delay = delay.min(remaining);
                    }
                    warn!(target: "timetravel::store", error = %e, attempt, ?delay, "retrying conflicting write");
                    std::thread::sleep(delay);
                    ctx.checkpoint()?;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
