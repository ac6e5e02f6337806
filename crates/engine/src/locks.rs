//! Per-record write locks
//!
//! Every read-modify-write on a record runs under that record's mutex, so
//! writers on the same id are serialized and writers on different ids never
//! wait on each other. Plain reads take no lock.
//!
//! Entries are created on first use. `remove` drops an entry once the record
//! has no rows left and nobody else holds the lock, so the map does not grow
//! with deleted records.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use timetravel_core::{Error, OpContext, RecordId, Result};

/// Lock table keyed by record id
#[derive(Debug, Default)]
pub struct RecordLocks {
    locks: DashMap<RecordId, Arc<Mutex<()>>>,
}

impl RecordLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `id`
    ///
    /// Waits at most until the context deadline. Fails with `Cancelled` when
    /// the context is done before or while waiting.
    pub fn with_lock<T>(
        &self,
        ctx: &OpContext,
        id: RecordId,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        ctx.checkpoint()?;
        // Clone out of the map so the shard lock is not held while waiting.
        let lock = Arc::clone(&*self.locks.entry(id).or_default());
        let _guard = match ctx.deadline() {
            Some(deadline) => lock.try_lock_until(deadline).ok_or(Error::Cancelled)?,
            None => lock.lock(),
        };
        ctx.checkpoint()?;
        f()
    }

    /// Drop the entry for `id` if no caller holds or waits on it
    pub fn remove(&self, id: RecordId) {
        self.locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of tracked records
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Check if no records are tracked
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
