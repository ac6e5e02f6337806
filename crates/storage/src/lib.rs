//! Storage layer for timetravel
//!
//! This crate implements the version table backends:
//! - MemoryTable: DashMap + BTreeMap version chains, nothing persisted
//! - SqliteTable: one `records` table per SQLite file, legacy or versioned shape
//! - FieldCodec: how a field map becomes the opaque `data` column
//!
//! Both backends implement [`timetravel_core::VersionTable`], so the engine
//! never knows which one it is talking to.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod memory;
pub mod sqlite;

pub use codec::{get_codec, CodecError, FieldCodec, JsonCodec};
pub use memory::{MemoryTable, VersionChain};
pub use sqlite::{JournalMode, SqliteConfig, SqliteTable, SyncMode};
