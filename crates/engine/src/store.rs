//! Record store facade
//!
//! `RecordStore` composes the version table, resolver, update engine and
//! versioning policy into the operations callers use:
//!
//! ```text
//! create(id, fields)                 -> version 1
//! get(id, Latest | Exact(v))         -> snapshot
//! latest_version(id)                 -> highest version
//! update(id, directives, mode)       -> next snapshot (append or overwrite)
//! upsert(id, directives, mode)       -> update, or create from the set directives
//! delete_version(id, v)              -> removes exactly (id, v)
//! history(id)                        -> all snapshots, newest first
//! ```
//!
//! # Concurrency
//!
//! Writes on the same id run under that id's lock, so a read-modify-write
//! never interleaves with another write on the record. The table enforces the
//! same thing across stores: appends claim their version with a
//! compare-and-insert, and overwrites replace the latest row only if it is
//! still the one that was read. A collision (another store on the same file)
//! is retried under the configured [`RetryPolicy`]. Reads take no lock.
//!
//! # Lifecycle
//!
//! The table is injected at construction. `shutdown` stops new calls, waits
//! for in-flight ones up to the configured timeout, and closes the table.
//! Dropping the store closes the table without waiting.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use timetravel_core::{
    Directives, Error, Fields, OpContext, Record, RecordHistory, RecordId, Result, TableLayout,
    Version, VersionSelector, VersionTable, VersioningMode,
};
use timetravel_storage::{MemoryTable, SqliteTable};
use tracing::{debug, info, warn};

use crate::config::{Backend, StoreConfig};
use crate::locks::RecordLocks;
use crate::policy::{self, WritePlan};
use crate::resolver;
use crate::retry::RetryPolicy;
use crate::update;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of [`RecordStore::upsert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Snapshot that was written
    pub record: Record,
    /// `true` when the record did not exist and was created at version 1
    pub created: bool,
}

/// Versioned record store
pub struct RecordStore {
    table: Arc<dyn VersionTable>,
    locks: RecordLocks,
    retry: RetryPolicy,
    shutdown_timeout: Duration,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
}

/// Counts one call as in flight until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RecordStore {
    /// Wrap an already opened table
    pub fn new(table: Arc<dyn VersionTable>) -> Self {
        RecordStore {
            table,
            locks: RecordLocks::new(),
            retry: RetryPolicy::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            accepting: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Open the table described by `config` and wrap it
    ///
    /// # Errors
    ///
    /// Fails when the config is invalid or the table cannot be opened.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let table: Arc<dyn VersionTable> = match config.backend {
            Backend::Sqlite => Arc::new(SqliteTable::open(&config.sqlite_config())?),
            Backend::Memory => Arc::new(MemoryTable::with_layout(config.layout)),
        };
        info!(
            target: "timetravel::store",
            backend = ?config.backend,
            layout = %config.layout,
            "record store opened"
        );
        Ok(Self::new(table)
            .with_retry(config.retry.clone())
            .with_shutdown_timeout(config.shutdown_timeout()))
    }

    /// Versioned in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTable::new()))
    }

    /// Set the retry policy (builder style)
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the shutdown drain timeout (builder style)
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Layout of the underlying table
    pub fn layout(&self) -> TableLayout {
        self.table.layout()
    }

    /// Check if the store still accepts calls
    pub fn is_open(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Number of calls currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<InFlight<'_>> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        // shutdown may have started between the check and the increment
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(guard)
    }

    /// Create `id` at version 1
    ///
    /// # Errors
    ///
    /// `AlreadyExists` when `id` has any stored version.
    pub fn create(&self, ctx: &OpContext, id: RecordId, fields: Fields) -> Result<Record> {
        let _op = self.begin()?;
        self.locks.with_lock(ctx, id, || {
            if self.table.latest_version(ctx, id)?.is_some() {
                return Err(Error::AlreadyExists { id });
            }
            self.insert_first(ctx, id, fields)?
                .ok_or(Error::AlreadyExists { id })
        })
    }

    /// Get the snapshot selected by `selector`
    ///
    /// # Errors
    ///
    /// `RecordNotFound` when `id` has no rows; `VersionNotFound` when `id`
    /// exists but not at the requested version.
    pub fn get(&self, ctx: &OpContext, id: RecordId, selector: VersionSelector) -> Result<Record> {
        let _op = self.begin()?;
        resolver::resolve(self.table.as_ref(), ctx, id, selector)
    }

    /// Highest stored version of `id`
    pub fn latest_version(&self, ctx: &OpContext, id: RecordId) -> Result<Version> {
        let _op = self.begin()?;
        resolver::latest_version(self.table.as_ref(), ctx, id)
    }

    /// Apply `directives` to the latest snapshot of `id`
    ///
    /// `Versioned` appends `latest + 1`; `Legacy` overwrites the latest row in
    /// place.
    ///
    /// # Errors
    ///
    /// - `RecordNotFound` when `id` has no rows
    /// - `UnsupportedMode` for a versioned update on a legacy table
    /// - `VersionConflict` when retries are exhausted
    pub fn update(
        &self,
        ctx: &OpContext,
        id: RecordId,
        directives: &Directives,
        mode: VersioningMode,
    ) -> Result<Record> {
        let _op = self.begin()?;
        self.retry.run(ctx, || {
            self.locks
                .with_lock(ctx, id, || self.update_locked(ctx, id, directives, mode))
        })
    }

    /// Update `id` if it exists, otherwise create it from the `set` directives
    pub fn upsert(
        &self,
        ctx: &OpContext,
        id: RecordId,
        directives: &Directives,
        mode: VersioningMode,
    ) -> Result<UpsertOutcome> {
        let _op = self.begin()?;
        self.retry.run(ctx, || {
            self.locks.with_lock(ctx, id, || {
                if self.table.latest_version(ctx, id)?.is_some() {
                    let record = self.update_locked(ctx, id, directives, mode)?;
                    return Ok(UpsertOutcome {
                        record,
                        created: false,
                    });
                }
                match self.insert_first(ctx, id, directives.set_fields())? {
                    Some(record) => Ok(UpsertOutcome {
                        record,
                        created: true,
                    }),
                    None => Err(Error::VersionConflict {
                        id,
                        version: Version::FIRST,
                    }),
                }
            })
        })
    }

    /// Remove exactly the row `(id, version)`
    ///
    /// Other versions are never renumbered.
    ///
    /// # Errors
    ///
    /// `VersionNotFound` when that row does not exist.
    pub fn delete_version(&self, ctx: &OpContext, id: RecordId, version: Version) -> Result<()> {
        let _op = self.begin()?;
        let emptied = self.locks.with_lock(ctx, id, || {
            if !self.table.delete(ctx, id, version)? {
                return Err(Error::VersionNotFound { id, version });
            }
            debug!(target: "timetravel::store", %id, %version, "deleted version");
            Ok(self.table.latest_version(ctx, id)?.is_none())
        })?;
        if emptied {
            self.locks.remove(id);
        }
        Ok(())
    }

    /// Every stored snapshot of `id`, newest first
    ///
    /// # Errors
    ///
    /// `RecordNotFound` when `id` has no rows.
    pub fn history(&self, ctx: &OpContext, id: RecordId) -> Result<RecordHistory> {
        let _op = self.begin()?;
        RecordHistory::new(self.table.history(ctx, id)?).ok_or(Error::RecordNotFound { id })
    }

    /// Stop accepting calls, drain in-flight ones, close the table
    ///
    /// Calls made after this fail with `Closed`. Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<()> {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let start = Instant::now();
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if start.elapsed() > self.shutdown_timeout {
                warn!(
                    target: "timetravel::store",
                    in_flight = self.in_flight.load(Ordering::SeqCst),
                    timeout = ?self.shutdown_timeout,
                    "shutdown drain timed out"
                );
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        self.table.close()?;
        info!(target: "timetravel::store", "record store shut down");
        Ok(())
    }

    /// Run one update with the record lock held
    fn update_locked(
        &self,
        ctx: &OpContext,
        id: RecordId,
        directives: &Directives,
        mode: VersioningMode,
    ) -> Result<Record> {
        let current = resolver::resolve(self.table.as_ref(), ctx, id, VersionSelector::Latest)?;
        let plan = policy::plan(mode, self.table.layout(), current.version)?;
        let fields = update::apply(&current.fields, directives);

        match plan {
            WritePlan::Append { version } => {
                if !self.table.append_after(ctx, &current, version, &fields)? {
                    return Err(Error::VersionConflict { id, version });
                }
            }
            WritePlan::Overwrite { version } => {
                if !self.table.replace_latest(ctx, &current, &fields)? {
                    return Err(Error::VersionConflict { id, version });
                }
            }
        }

        debug!(
            target: "timetravel::store",
            %id,
            version = %plan.version(),
            %mode,
            "updated record"
        );
        Ok(Record::new(id, plan.version(), fields))
    }

    /// Insert version 1; `None` when the slot is already taken
    fn insert_first(&self, ctx: &OpContext, id: RecordId, fields: Fields) -> Result<Option<Record>> {
        if !self.table.insert(ctx, id, Version::FIRST, &fields)? {
            return Ok(None);
        }
        debug!(target: "timetravel::store", %id, "created record");
        Ok(Some(Record::new(id, Version::FIRST, fields)))
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("layout", &self.table.layout())
            .field("open", &self.is_open())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            let _ = self.table.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timetravel_core::CancelToken;

    fn id(n: u64) -> RecordId {
        RecordId::new(n).unwrap()
    }

    fn v(n: u64) -> Version {
        Version::new(n).unwrap()
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn ctx() -> OpContext {
        OpContext::background()
    }

    fn legacy_store() -> RecordStore {
        RecordStore::new(Arc::new(MemoryTable::with_layout(TableLayout::Legacy)))
    }

    #[test]
    fn test_create_then_get_latest() {
        let store = RecordStore::in_memory();
        let created = store.create(&ctx(), id(1), fields(&[("hello", "x")])).unwrap();
        assert_eq!(created.version, Version::FIRST);

        let got = store.get(&ctx(), id(1), VersionSelector::Latest).unwrap();
        assert_eq!(got, created);
    }

    #[test]
    fn test_double_create_keeps_first() {
        let store = RecordStore::in_memory();
        store.create(&ctx(), id(1), fields(&[("a", "1")])).unwrap();
        let err = store.create(&ctx(), id(1), fields(&[("a", "2")])).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));

        let got = store.get(&ctx(), id(1), VersionSelector::Latest).unwrap();
        assert_eq!(got.field("a"), Some("1"));
    }

    #[test]
    fn test_create_refused_while_later_version_exists() {
        let store = RecordStore::in_memory();
        store.create(&ctx(), id(1), fields(&[])).unwrap();
        store
            .update(&ctx(), id(1), &Directives::new().set("a", "1"), VersioningMode::Versioned)
            .unwrap();
        store.delete_version(&ctx(), id(1), v(1)).unwrap();

        let err = store.create(&ctx(), id(1), fields(&[])).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn test_versioned_update_appends() {
        let store = RecordStore::in_memory();
        store.create(&ctx(), id(1), fields(&[("a", "1"), ("b", "2")])).unwrap();

        let next = store
            .update(
                &ctx(),
                id(1),
                &Directives::new().delete("a").set("c", "3"),
                VersioningMode::Versioned,
            )
            .unwrap();
        assert_eq!(next.version, v(2));
        assert_eq!(next.fields, fields(&[("b", "2"), ("c", "3")]));

        let first = store.get(&ctx(), id(1), v(1).into()).unwrap();
        assert_eq!(first.fields, fields(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn test_update_missing_record() {
        let store = RecordStore::in_memory();
        let err = store
            .update(&ctx(), id(9), &Directives::new().set("a", "1"), VersioningMode::Versioned)
            .unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }));
    }

    #[test]
    fn test_legacy_update_overwrites() {
        let store = legacy_store();
        store.create(&ctx(), id(1), fields(&[("n", "0")])).unwrap();
        for n in 1..=5 {
            let record = store
                .update(
                    &ctx(),
                    id(1),
                    &Directives::new().set("n", n.to_string()),
                    VersioningMode::Legacy,
                )
                .unwrap();
            assert_eq!(record.version, Version::FIRST);
        }

        let history = store.history(&ctx(), id(1)).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().field("n"), Some("5"));
        assert_eq!(store.latest_version(&ctx(), id(1)).unwrap(), Version::FIRST);
    }

    #[test]
    fn test_versioned_update_on_legacy_table() {
        let store = legacy_store();
        store.create(&ctx(), id(1), fields(&[])).unwrap();
        let err = store
            .update(&ctx(), id(1), &Directives::new().set("a", "1"), VersioningMode::Versioned)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMode { .. }));
    }

    #[test]
    fn test_legacy_update_on_versioned_table_overwrites_latest() {
        let store = RecordStore::in_memory();
        store.create(&ctx(), id(1), fields(&[("a", "1")])).unwrap();
        store
            .update(&ctx(), id(1), &Directives::new().set("a", "2"), VersioningMode::Versioned)
            .unwrap();
        let record = store
            .update(&ctx(), id(1), &Directives::new().set("a", "3"), VersioningMode::Legacy)
            .unwrap();
        assert_eq!(record.version, v(2));

        let history = store.history(&ctx(), id(1)).unwrap();
        assert_eq!(history.versions(), vec![v(2), v(1)]);
        assert_eq!(history.latest().field("a"), Some("3"));
        assert_eq!(history.oldest().field("a"), Some("1"));
    }

    #[test]
    fn test_upsert_creates_from_set_directives() {
        let store = RecordStore::in_memory();
        let outcome = store
            .upsert(
                &ctx(),
                id(1),
                &Directives::new().set("hello", "x").delete("gone"),
                VersioningMode::Versioned,
            )
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.record.version, Version::FIRST);
        assert_eq!(outcome.record.fields, fields(&[("hello", "x")]));

        let outcome = store
            .upsert(&ctx(), id(1), &Directives::new().set("hello", "z"), VersioningMode::Versioned)
            .unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.record.version, v(2));
    }

    #[test]
    fn test_delete_version() {
        let store = RecordStore::in_memory();
        store.create(&ctx(), id(1), fields(&[("n", "1")])).unwrap();
        store
            .update(&ctx(), id(1), &Directives::new().set("n", "2"), VersioningMode::Versioned)
            .unwrap();

        store.delete_version(&ctx(), id(1), v(1)).unwrap();
        assert!(matches!(
            store.get(&ctx(), id(1), v(1).into()),
            Err(Error::VersionNotFound { .. })
        ));
        assert_eq!(store.get(&ctx(), id(1), v(2).into()).unwrap().field("n"), Some("2"));
        assert!(matches!(
            store.delete_version(&ctx(), id(1), v(1)),
            Err(Error::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_deleting_last_version_removes_record() {
        let store = RecordStore::in_memory();
        store.create(&ctx(), id(1), fields(&[])).unwrap();
        store.delete_version(&ctx(), id(1), v(1)).unwrap();

        assert!(store.locks.is_empty());
        assert!(matches!(
            store.get(&ctx(), id(1), VersionSelector::Latest),
            Err(Error::RecordNotFound { .. })
        ));
        assert!(matches!(
            store.history(&ctx(), id(1)),
            Err(Error::RecordNotFound { .. })
        ));
        store.create(&ctx(), id(1), fields(&[("again", "yes")])).unwrap();
    }

    #[test]
    fn test_delete_absent_record_is_version_not_found() {
        let store = RecordStore::in_memory();
        assert!(matches!(
            store.delete_version(&ctx(), id(4), v(1)),
            Err(Error::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_cancelled_token_stops_writes() {
        let store = RecordStore::in_memory();
        let token = CancelToken::new();
        token.cancel();
        let cancelled = OpContext::background().cancel_on(token);

        let err = store.create(&cancelled, id(1), fields(&[])).unwrap_err();
        assert!(err.is_cancelled());
        assert!(store.get(&ctx(), id(1), VersionSelector::Latest).is_err());
        assert_eq!(store.in_flight(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent_and_closes() {
        let store = RecordStore::in_memory();
        store.create(&ctx(), id(1), fields(&[])).unwrap();
        store.shutdown().unwrap();
        store.shutdown().unwrap();

        assert!(!store.is_open());
        assert!(matches!(
            store.get(&ctx(), id(1), VersionSelector::Latest),
            Err(Error::Closed)
        ));
    }

    #[test]
    fn test_open_memory_from_config() {
        let store = RecordStore::open(&StoreConfig::memory().with_layout(TableLayout::Legacy)).unwrap();
        assert_eq!(store.layout(), TableLayout::Legacy);
    }
}
