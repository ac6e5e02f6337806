//! Compatibility modes
//!
//! Two independent choices govern how history is kept:
//!
//! - [`VersioningMode`] is chosen per update call by the boundary layer. It
//!   decides whether an update appends a new version or overwrites in place.
//! - [`TableLayout`] is fixed when a table is opened. It is the on-disk shape
//!   of the table. A legacy-layout table has no version column and can only
//!   serve legacy updates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a single update is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningMode {
    /// Overwrite the current row in place. Never allocates a version number.
    Legacy,
    /// Append `latest + 1`, leaving earlier versions untouched.
    #[default]
    Versioned,
}

impl VersioningMode {
    /// Check if updates in this mode preserve history
    pub const fn keeps_history(&self) -> bool {
        matches!(self, VersioningMode::Versioned)
    }

    /// Mode name as written in configuration
    pub const fn as_str(&self) -> &'static str {
        match self {
            VersioningMode::Legacy => "legacy",
            VersioningMode::Versioned => "versioned",
        }
    }
}

impl fmt::Display for VersioningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk shape of a version table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableLayout {
    /// `(id PRIMARY KEY, data)`; exactly one row per record, always version 1
    Legacy,
    /// `(id, data, ver)` unique on `(id, ver)`
    #[default]
    Versioned,
}

impl TableLayout {
    /// Check if a table of this layout can persist updates made in `mode`
    pub const fn supports(&self, mode: VersioningMode) -> bool {
        match self {
            TableLayout::Versioned => true,
            TableLayout::Legacy => matches!(mode, VersioningMode::Legacy),
        }
    }

    /// Layout name as written in configuration
    pub const fn as_str(&self) -> &'static str {
        match self {
            TableLayout::Legacy => "legacy",
            TableLayout::Versioned => "versioned",
        }
    }
}

impl fmt::Display for TableLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
