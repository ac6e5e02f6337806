//! Version table abstraction
//!
//! [`VersionTable`] is the durable `(record_id, version) -> fields` substrate.
//! Swapping the in-memory table for the SQLite one (or anything else with an
//! ordered, durable key space) does not affect the layers above it.

use crate::context::OpContext;
use crate::error::Result;
use crate::mode::TableLayout;
use crate::record::Record;
use crate::types::{Fields, RecordId, Version};

/// Durable storage keyed by `(id, version)`
///
/// Thread safety: all methods must be safe to call concurrently from multiple
/// threads, and from other handles on the same storage. Each method is atomic
/// with respect to concurrent calls on the same record.
///
/// Every method checks `ctx` before touching storage and fails with
/// `Error::Cancelled` once it is done. A cancelled call leaves no partial row.
///
/// Returned records own their field maps. Callers may mutate them freely
/// without affecting stored state, and a table never retains the map passed
/// to `put`/`insert`.
pub trait VersionTable: Send + Sync {
    /// On-disk shape of this table
    fn layout(&self) -> TableLayout;

    /// Insert or replace the row at `(id, version)`
    ///
    /// # Errors
    ///
    /// `InvalidInput` when a legacy-layout table is asked for a version other
    /// than 1; storage errors otherwise.
    fn put(&self, ctx: &OpContext, id: RecordId, version: Version, fields: &Fields) -> Result<()>;

    /// Insert the row at `(id, version)` only if that key is vacant
    ///
    /// Returns `false` without writing when the row already exists.
    fn insert(
        &self,
        ctx: &OpContext,
        id: RecordId,
        version: Version,
        fields: &Fields,
    ) -> Result<bool>;

    /// Insert `(base.id, version)` only while `base` is still the latest
    /// row of its record and still holds `base.fields`
    ///
    /// Returns `false` without writing when another writer appended, changed
    /// or removed a row of the record since `base` was read.
    fn append_after(
        &self,
        ctx: &OpContext,
        base: &Record,
        version: Version,
        fields: &Fields,
    ) -> Result<bool>;

    /// Replace the row `base` was read from, under the same condition as
    /// [`append_after`](Self::append_after)
    fn replace_latest(&self, ctx: &OpContext, base: &Record, fields: &Fields) -> Result<bool>;

    /// Exact lookup
    fn get(&self, ctx: &OpContext, id: RecordId, version: Version) -> Result<Option<Record>>;

    /// Row with the highest version for `id`
    fn get_latest(&self, ctx: &OpContext, id: RecordId) -> Result<Option<Record>>;

    /// Highest stored version for `id`, without decoding the row
    fn latest_version(&self, ctx: &OpContext, id: RecordId) -> Result<Option<Version>>;

    /// Every stored row for `id`, newest first
    fn history(&self, ctx: &OpContext, id: RecordId) -> Result<Vec<Record>>;

    /// Remove exactly the row at `(id, version)`
    ///
    /// Returns `false` when no row was affected.
    fn delete(&self, ctx: &OpContext, id: RecordId, version: Version) -> Result<bool>;

    /// Release the underlying handle. Later calls fail with `Error::Closed`.
    fn close(&self) -> Result<()>;
}
