//! Error types for the record store
//!
//! Every layer returns [`Error`]. The store never formats user-facing
//! messages or logs failures on behalf of the caller; the boundary layer maps
//! these variants onto its own responses.
//!
//! ## Classes
//!
//! - not found: [`Error::RecordNotFound`], [`Error::VersionNotFound`]
//! - conflict: [`Error::AlreadyExists`], [`Error::VersionConflict`]
//! - caller error: [`Error::InvalidInput`], [`Error::UnsupportedMode`]
//! - caller driven: [`Error::Cancelled`]
//! - system fault: [`Error::Storage`], [`Error::Closed`]

use thiserror::Error;

use crate::mode::{TableLayout, VersioningMode};
use crate::types::{RecordId, Version};

/// Result type alias for record store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error source carried by [`Error::Storage`]
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for the record store
#[derive(Debug, Error)]
pub enum Error {
    /// No row exists for the record
    #[error("record of id {id} does not exist")]
    RecordNotFound {
        /// Requested record
        id: RecordId,
    },

    /// The record exists but the requested version does not
    #[error("record of id {id} with version {version} does not exist")]
    VersionNotFound {
        /// Requested record
        id: RecordId,
        /// Requested version
        version: Version,
    },

    /// `create` was called for a record that already has a row
    #[error("record of id {id} already exists")]
    AlreadyExists {
        /// Conflicting record
        id: RecordId,
    },

    /// A write kept colliding with a concurrent writer on the same record
    #[error("version {version} of record {id} was written concurrently")]
    VersionConflict {
        /// Record being written
        id: RecordId,
        /// Version that could not be claimed or replaced
        version: Version,
    },

    /// Persistence engine failure (I/O, corruption, connection loss)
    #[error("storage failure: {message}")]
    Storage {
        /// What failed
        message: String,
        /// Underlying engine error
        #[source]
        source: Option<BoxedSource>,
    },

    /// Aborted by the caller's deadline or cancel token
    #[error("operation cancelled")]
    Cancelled,

    /// Malformed identifier, version, or configuration
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A table layout that cannot persist updates of the requested mode
    #[error("{mode} updates are not supported by a {layout} table")]
    UnsupportedMode {
        /// Requested update mode
        mode: VersioningMode,
        /// Layout of the table
        layout: TableLayout,
    },

    /// The store or table has been shut down
    #[error("record store is closed")]
    Closed,
}

impl Error {
    /// Storage failure without an underlying source
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Storage failure wrapping the engine error that caused it
    pub fn storage_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Check if this is a legitimate absence rather than a fault
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::RecordNotFound { .. } | Error::VersionNotFound { .. }
        )
    }

    /// Check if this indicates a system fault
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::Closed)
    }

    /// Check if the caller's deadline or token aborted the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Check if a concurrent writer got to the version first
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }
}
