//! Versioning policy
//!
//! Decides how an update is persisted. The mode comes with every update call;
//! the table layout is fixed when the table is opened.
//!
//! | mode      | layout    | plan                                  |
//! |-----------|-----------|---------------------------------------|
//! | legacy    | legacy    | overwrite version 1                   |
//! | legacy    | versioned | overwrite the current latest in place |
//! | versioned | versioned | append latest + 1                     |
//! | versioned | legacy    | `UnsupportedMode`                     |

use timetravel_core::{Error, Result, TableLayout, Version, VersioningMode};

/// How the next state of a record is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePlan {
    /// Insert a new row; the previous latest stays untouched
    Append {
        /// Version the new row claims
        version: Version,
    },
    /// Replace the existing row
    Overwrite {
        /// Version being replaced
        version: Version,
    },
}

impl WritePlan {
    /// Version of the row the plan writes
    pub fn version(&self) -> Version {
        match self {
            WritePlan::Append { version } | WritePlan::Overwrite { version } => *version,
        }
    }

    /// Check if the plan keeps the previous version
    pub fn is_append(&self) -> bool {
        matches!(self, WritePlan::Append { .. })
    }
}

/// Plan the write for an update of a record whose latest version is `current`
///
/// Appends take `current + 1`. If the previous latest version was deleted,
/// its number is handed out again, so `(id, version)` only names one
/// snapshot for as long as that row exists.
pub fn plan(mode: VersioningMode, layout: TableLayout, current: Version) -> Result<WritePlan> {
    if !layout.supports(mode) {
        return Err(Error::UnsupportedMode { mode, layout });
    }
    match mode {
        VersioningMode::Legacy => Ok(WritePlan::Overwrite { version: current }),
        VersioningMode::Versioned => {
            let version = current.next().ok_or_else(|| {
                Error::invalid_input(format!("no version after {} is available", current))
            })?;
            Ok(WritePlan::Append { version })
        }
    }
}
