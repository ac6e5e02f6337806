//! Per-call cancellation context
//!
//! [`OpContext`] threads a caller deadline and an optional [`CancelToken`]
//! through the store. Blocking table calls invoke [`OpContext::checkpoint`]
//! before touching storage, and storage engines that support interruption poll
//! [`OpContext::is_done`] while a statement runs.
//!
//! ```text
//! let ctx = OpContext::with_timeout(Duration::from_millis(200));
//! store.get(&ctx, id, VersionSelector::Latest)?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Shared flag a caller flips to abort in-flight operations
///
/// Cloning shares the flag. Cancellation is one-way.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation was requested
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Deadline and cancellation signal for one store call
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    token: Option<CancelToken>,
}

impl OpContext {
    /// Context that never cancels
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that cancels at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        OpContext {
            deadline: Some(deadline),
            token: None,
        }
    }

    /// Context that cancels `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Attach a cancel token (builder style)
    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Tighten the deadline; a later deadline than the current one is ignored
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Check if this context can ever cancel
    pub fn is_cancellable(&self) -> bool {
        self.deadline.is_some() || self.token.is_some()
    }

    /// Check if the deadline has passed or the token fired
    #[inline]
    pub fn is_done(&self) -> bool {
        if let Some(token) = &self.token {
            if token.is_cancelled() {
                return true;
            }
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Fail with [`Error::Cancelled`] once the context is done
    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_done() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
