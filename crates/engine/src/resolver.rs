//! Record resolution
//!
//! Maps `(id, selector)` onto a stored snapshot and turns table-level absence
//! into the right not-found error.
//!
//! A `Latest` read returns whichever version was highest at the moment the
//! table answered. Writers committing afterwards are not reflected.

use timetravel_core::{
    Error, OpContext, Record, RecordId, Result, Version, VersionSelector, VersionTable,
};

/// Resolve a selector to a snapshot
///
/// # Errors
///
/// - `RecordNotFound` when `id` has no rows at all
/// - `VersionNotFound` when `id` has rows but not the requested version
pub fn resolve(
    table: &dyn VersionTable,
    ctx: &OpContext,
    id: RecordId,
    selector: VersionSelector,
) -> Result<Record> {
    match selector {
        VersionSelector::Latest => table
            .get_latest(ctx, id)?
            .ok_or(Error::RecordNotFound { id }),
        VersionSelector::Exact(version) => match table.get(ctx, id, version)? {
            Some(record) => Ok(record),
            None => Err(absent_version(table, ctx, id, version)?),
        },
    }
}

/// Highest stored version of `id`
pub fn latest_version(table: &dyn VersionTable, ctx: &OpContext, id: RecordId) -> Result<Version> {
    table
        .latest_version(ctx, id)?
        .ok_or(Error::RecordNotFound { id })
}

/// Classify a missing exact version
fn absent_version(
    table: &dyn VersionTable,
    ctx: &OpContext,
    id: RecordId,
    version: Version,
) -> Result<Error> {
    Ok(match table.latest_version(ctx, id)? {
        Some(_) => Error::VersionNotFound { id, version },
        None => Error::RecordNotFound { id },
    })
}
