//! Record engine for timetravel
//!
//! This crate composes the lower layers into the record store:
//! - RecordStore: create/get/update/upsert/delete_version/history, open and shutdown
//! - Resolver: selector to snapshot, not-found classification
//! - Update engine: pure set/delete directive application
//! - Versioning policy: append vs overwrite, per call
//! - RecordLocks: per-id write serialization
//! - RetryPolicy: backoff for conflicting appends
//! - StoreConfig: `timetravel.toml`
//!
//! The engine is the only component that knows how a write becomes a version.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod locks;
pub mod policy;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod update;

pub use config::{Backend, StoreConfig, CONFIG_FILE_NAME};
pub use locks::RecordLocks;
pub use policy::WritePlan;
pub use retry::RetryPolicy;
pub use store::{RecordStore, UpsertOutcome};
