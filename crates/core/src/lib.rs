//! Core types and traits for the timetravel record store
//!
//! This crate defines the foundational types used throughout the system:
//! - RecordId / Version: positive integer identifiers
//! - VersionSelector: exact version or "latest"
//! - Record / RecordHistory: stored snapshots
//! - Directives: per-field set/delete instructions
//! - VersioningMode / TableLayout: legacy vs versioned persistence
//! - OpContext / CancelToken: deadline and cancellation propagation
//! - VersionTable: the storage abstraction
//! - Error: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod directive;
pub mod error;
pub mod mode;
pub mod record;
pub mod traits;
pub mod types;

pub use context::{CancelToken, OpContext};
pub use directive::{Directive, Directives};
pub use error::{Error, Result};
pub use mode::{TableLayout, VersioningMode};
pub use record::{Record, RecordHistory};
pub use traits::VersionTable;
pub use types::{Fields, RecordId, Version, VersionSelector, MAX_ID};
