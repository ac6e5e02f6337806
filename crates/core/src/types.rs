//! Identifier types for records and their versions
//!
//! Both identifiers are positive integers. They are stored in SQLite
//! `INTEGER` columns, so the upper bound is `i64::MAX`.
//!
//! ## Version Ordering
//!
//! Versions are totally ordered. In versioned mode the versions of a record
//! form the contiguous run `1..=latest`; in legacy mode the only version is
//! [`Version::FIRST`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Field map of a record snapshot.
///
/// Keys are unique. A missing key means the field does not exist, which is
/// distinct from a key mapped to an empty string. `BTreeMap` keeps iteration
/// and serialization order deterministic.
pub type Fields = BTreeMap<String, String>;

/// Largest identifier or version that round-trips through an `INTEGER` column.
pub const MAX_ID: u64 = i64::MAX as u64;

/// Caller-assigned identifier of a record
///
/// Stable for the lifetime of the record. Always in `1..=MAX_ID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct RecordId(u64);

impl RecordId {
    /// Create a record id, rejecting zero and values above [`MAX_ID`].
    pub fn new(id: u64) -> Result<Self> {
        if id == 0 || id > MAX_ID {
            return Err(Error::InvalidInput(format!(
                "invalid id {}; id must be a positive number",
                id
            )));
        }
        Ok(RecordId(id))
    }

    /// Get the numeric value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Numeric value as stored in an `INTEGER` column
    #[inline]
    pub const fn as_i64(&self) -> i64 {
        self.0 as i64
    }
}

impl TryFrom<u64> for RecordId {
    type Error = Error;

    fn try_from(id: u64) -> Result<Self> {
        RecordId::new(id)
    }
}

impl TryFrom<i64> for RecordId {
    type Error = Error;

    fn try_from(id: i64) -> Result<Self> {
        if id <= 0 {
            return Err(Error::InvalidInput(format!(
                "invalid id {}; id must be a positive number",
                id
            )));
        }
        RecordId::new(id as u64)
    }
}

impl From<RecordId> for u64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: i64 = s.trim().parse().map_err(|_| {
            Error::InvalidInput(format!("invalid id {:?}; id must be a positive number", s))
        })?;
        RecordId::try_from(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version number of a record snapshot
///
/// ## Invariants
///
/// - Always in `1..=MAX_ID`
/// - Strictly increasing per record in versioned mode
/// - Fixed at [`Version::FIRST`] in legacy mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Version(u64);

impl Version {
    /// Version assigned by `create`, and the only version in legacy mode.
    pub const FIRST: Version = Version(1);

    /// Create a version, rejecting zero and values above [`MAX_ID`].
    pub fn new(version: u64) -> Result<Self> {
        if version == 0 || version > MAX_ID {
            return Err(Error::InvalidInput(format!(
                "invalid version {}; version must be a positive number",
                version
            )));
        }
        Ok(Version(version))
    }

    /// Get the numeric value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Numeric value as stored in an `INTEGER` column
    #[inline]
    pub const fn as_i64(&self) -> i64 {
        self.0 as i64
    }

    /// The version following this one, or `None` once the version space is exhausted.
    pub fn next(&self) -> Option<Version> {
        match self.0.checked_add(1) {
            Some(v) if v <= MAX_ID => Some(Version(v)),
            _ => None,
        }
    }

    /// Check if this is the first version
    #[inline]
    pub const fn is_first(&self) -> bool {
        self.0 == 1
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::FIRST
    }
}

impl TryFrom<u64> for Version {
    type Error = Error;

    fn try_from(version: u64) -> Result<Self> {
        Version::new(version)
    }
}

impl TryFrom<i64> for Version {
    type Error = Error;

    fn try_from(version: i64) -> Result<Self> {
        if version <= 0 {
            return Err(Error::InvalidInput(format!(
                "invalid version {}; version must be a positive number",
                version
            )));
        }
        Version::new(version as u64)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let version: i64 = s.trim().parse().map_err(|_| {
            Error::InvalidInput(format!(
                "invalid version {:?}; version must be a positive number",
                s
            ))
        })?;
        Version::try_from(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which snapshot of a record a read addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VersionSelector {
    /// The snapshot with the highest stored version
    #[default]
    Latest,
    /// One specific version
    Exact(Version),
}

impl VersionSelector {
    /// The exact version, if one was selected
    pub fn exact(&self) -> Option<Version> {
        match self {
            VersionSelector::Latest => None,
            VersionSelector::Exact(v) => Some(*v),
        }
    }

    /// Check if this selector addresses the latest snapshot
    pub fn is_latest(&self) -> bool {
        matches!(self, VersionSelector::Latest)
    }
}

impl From<Version> for VersionSelector {
    fn from(version: Version) -> Self {
        VersionSelector::Exact(version)
    }
}

impl From<Option<Version>> for VersionSelector {
    fn from(version: Option<Version>) -> Self {
        match version {
            Some(v) => VersionSelector::Exact(v),
            None => VersionSelector::Latest,
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Latest => write!(f, "latest"),
            VersionSelector::Exact(v) => write!(f, "{}", v),
        }
    }
}
