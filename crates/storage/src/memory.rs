//! Sharded in-memory version table
//!
//! DashMap keyed by record id, one [`VersionChain`] per record.
//!
//! # Design
//!
//! - DashMap: sharded, so writers on different records rarely contend
//! - BTreeMap per record: ordered by version, latest is the last entry
//! - Rows are cloned on the way in and on the way out; callers never share
//!   a map with stored state
//!
//! Nothing is persisted. Used for tests, caches and ephemeral stores.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use timetravel_core::{
    Error, Fields, OpContext, Record, RecordId, Result, TableLayout, Version, VersionTable,
};
use tracing::debug;

/// Stored versions of one record, ordered by version
#[derive(Debug, Clone, Default)]
pub struct VersionChain {
    versions: BTreeMap<Version, Fields>,
}

impl VersionChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a version
    pub fn put(&mut self, version: Version, fields: Fields) {
        self.versions.insert(version, fields);
    }

    /// Get an exact version
    pub fn get(&self, version: Version) -> Option<&Fields> {
        self.versions.get(&version)
    }

    /// Get the highest version
    pub fn latest(&self) -> Option<(Version, &Fields)> {
        self.versions.iter().next_back().map(|(v, f)| (*v, f))
    }

    /// Check if a version is stored
    pub fn contains(&self, version: Version) -> bool {
        self.versions.contains_key(&version)
    }

    /// Remove a version, returning whether it existed
    pub fn remove(&mut self, version: Version) -> bool {
        self.versions.remove(&version).is_some()
    }

    /// Versions newest-first
    pub fn history(&self) -> impl Iterator<Item = (Version, &Fields)> {
        self.versions.iter().rev().map(|(v, f)| (*v, f))
    }

    /// Number of versions stored
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// In-memory [`VersionTable`]
///
/// # Thread Safety
///
/// All operations are thread-safe. Each operation holds the shard lock of a
/// single record for its whole duration, so it is atomic for that record.
pub struct MemoryTable {
    records: DashMap<RecordId, VersionChain>,
    layout: TableLayout,
    closed: AtomicBool,
}

impl MemoryTable {
    /// Create an empty versioned-layout table
    pub fn new() -> Self {
        Self::with_layout(TableLayout::Versioned)
    }

    /// Create an empty table with the given layout
    pub fn with_layout(layout: TableLayout) -> Self {
        Self {
            records: DashMap::new(),
            layout,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of records with at least one stored version
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Total number of stored rows across all records
    pub fn row_count(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    fn check_open(&self, ctx: &OpContext) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        ctx.checkpoint()
    }

    fn check_layout(&self, version: Version) -> Result<()> {
        if self.layout == TableLayout::Legacy && !version.is_first() {
            return Err(Error::invalid_input(format!(
                "legacy table only stores version 1, got {}",
                version
            )));
        }
        Ok(())
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTable")
            .field("layout", &self.layout)
            .field("record_count", &self.record_count())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl VersionTable for MemoryTable {
    fn layout(&self) -> TableLayout {
        self.layout
    }

    fn put(&self, ctx: &OpContext, id: RecordId, version: Version, fields: &Fields) -> Result<()> {
        self.check_open(ctx)?;
        self.check_layout(version)?;
        self.records
            .entry(id)
            .or_default()
            .put(version, fields.clone());
        debug!(target: "timetravel::memory", %id, %version, "put row");
        Ok(())
    }

    fn insert(
        &self,
        ctx: &OpContext,
        id: RecordId,
        version: Version,
        fields: &Fields,
    ) -> Result<bool> {
        self.check_open(ctx)?;
        self.check_layout(version)?;
        let mut chain = self.records.entry(id).or_default();
        if chain.contains(version) {
            return Ok(false);
        }
        chain.put(version, fields.clone());
        debug!(target: "timetravel::memory", %id, %version, "inserted row");
        Ok(true)
    }

    fn append_after(
        &self,
        ctx: &OpContext,
        base: &Record,
        version: Version,
        fields: &Fields,
    ) -> Result<bool> {
        self.check_open(ctx)?;
        self.check_layout(version)?;
        let Some(mut chain) = self.records.get_mut(&base.id) else {
            return Ok(false);
        };
        if chain.latest() != Some((base.version, &base.fields)) || chain.contains(version) {
            return Ok(false);
        }
        chain.put(version, fields.clone());
        debug!(target: "timetravel::memory", id = %base.id, %version, "appended row");
        Ok(true)
    }

    fn replace_latest(&self, ctx: &OpContext, base: &Record, fields: &Fields) -> Result<bool> {
        self.check_open(ctx)?;
        let Some(mut chain) = self.records.get_mut(&base.id) else {
            return Ok(false);
        };
        if chain.latest() != Some((base.version, &base.fields)) {
            return Ok(false);
        }
        chain.put(base.version, fields.clone());
        debug!(target: "timetravel::memory", id = %base.id, version = %base.version, "replaced latest row");
        Ok(true)
    }

    fn get(&self, ctx: &OpContext, id: RecordId, version: Version) -> Result<Option<Record>> {
        self.check_open(ctx)?;
        Ok(self.records.get(&id).and_then(|chain| {
            chain
                .get(version)
                .map(|fields| Record::new(id, version, fields.clone()))
        }))
    }

    fn get_latest(&self, ctx: &OpContext, id: RecordId) -> Result<Option<Record>> {
        self.check_open(ctx)?;
        Ok(self.records.get(&id).and_then(|chain| {
            chain
                .latest()
                .map(|(version, fields)| Record::new(id, version, fields.clone()))
        }))
    }

    fn latest_version(&self, ctx: &OpContext, id: RecordId) -> Result<Option<Version>> {
        self.check_open(ctx)?;
        Ok(self
            .records
            .get(&id)
            .and_then(|chain| chain.latest().map(|(version, _)| version)))
    }

    fn history(&self, ctx: &OpContext, id: RecordId) -> Result<Vec<Record>> {
        self.check_open(ctx)?;
        Ok(self
            .records
            .get(&id)
            .map(|chain| {
                chain
                    .history()
                    .map(|(version, fields)| Record::new(id, version, fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete(&self, ctx: &OpContext, id: RecordId, version: Version) -> Result<bool> {
        self.check_open(ctx)?;
        let removed = match self.records.get_mut(&id) {
            Some(mut chain) => chain.remove(version),
            None => false,
        };
        // The shard guard must be released before remove_if takes it again.
        if removed {
            self.records.remove_if(&id, |_, chain| chain.is_empty());
            debug!(target: "timetravel::memory", %id, %version, "deleted row");
        }
        Ok(removed)
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.records.clear();
        Ok(())
    }
}
