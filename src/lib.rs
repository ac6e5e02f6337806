//! Timetravel - versioned record store with point-in-time reads
//!
//! Records are string-to-string field maps addressed by a positive id. Every
//! update either appends a new version (history kept) or overwrites the
//! current one (legacy clients), chosen per call.
//!
//! # Quick Start
//!
//! ```ignore
//! use timetravel::{
//!     Directives, OpContext, RecordId, RecordStore, StoreConfig, Version, VersionSelector,
//!     VersioningMode,
//! };
//!
//! let store = RecordStore::open(&StoreConfig::sqlite("records.db"))?;
//! let ctx = OpContext::background();
//! let id = RecordId::new(1)?;
//!
//! store.create(&ctx, id, [("hello".to_string(), "x".to_string())].into())?;
//! store.update(&ctx, id, &Directives::new().set("hello", "z"), VersioningMode::Versioned)?;
//!
//! let first = store.get(&ctx, id, Version::FIRST.into())?;     // {hello: x}
//! let latest = store.get(&ctx, id, VersionSelector::Latest)?;  // {hello: z}, version 2
//! store.shutdown()?;
//! ```
//!
//! # Architecture
//!
//! - `timetravel-core`: data model, errors, cancellation, the `VersionTable` trait
//! - `timetravel-storage`: in-memory and SQLite version tables
//! - `timetravel-engine`: the `RecordStore` facade and its configuration

pub use timetravel_core::{
    CancelToken, Directive, Directives, Error, Fields, OpContext, Record, RecordHistory, RecordId,
    Result, TableLayout, Version, VersionSelector, VersionTable, VersioningMode, MAX_ID,
};
pub use timetravel_engine::{
    Backend, RecordStore, RetryPolicy, StoreConfig, UpsertOutcome, CONFIG_FILE_NAME,
};
pub use timetravel_storage::{
    FieldCodec, JournalMode, JsonCodec, MemoryTable, SqliteConfig, SqliteTable, SyncMode,
};
