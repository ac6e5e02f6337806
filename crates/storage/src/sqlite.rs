//! SQLite version table
//!
//! One `records` table per database file. The shape depends on the layout:
//!
//! ```text
//! versioned: records(id INTEGER NOT NULL, data TEXT NOT NULL, ver INTEGER NOT NULL,
//!                    PRIMARY KEY (id, ver))
//! legacy:    records(id INTEGER PRIMARY KEY, data TEXT NOT NULL)
//! ```
//!
//! The two shapes are not interchangeable. Opening a file whose table has the
//! other shape fails instead of migrating.
//!
//! Every statement is a single-row write or a read, so SQLite's statement
//! atomicity is enough: an interrupted statement leaves no partial row.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use timetravel_core::{
    Error, Fields, OpContext, Record, RecordId, Result, TableLayout, Version, VersionTable,
};
use tracing::{debug, info};

use crate::codec::{get_codec, FieldCodec};

/// Virtual machine instructions between cancellation polls
const PROGRESS_OPS: i32 = 1000;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite journal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write-ahead log
    #[default]
    Wal,
    /// Rollback journal, deleted after each transaction
    Delete,
}

impl JournalMode {
    /// Value for `PRAGMA journal_mode`
    pub const fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "wal",
            JournalMode::Delete => "delete",
        }
    }
}

/// SQLite synchronous mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Sync on every commit
    #[default]
    Full,
    /// Sync at checkpoints only
    Normal,
}

impl SyncMode {
    /// Value for `PRAGMA synchronous`
    pub const fn pragma_value(self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Normal => "normal",
        }
    }
}

/// Settings for opening a [`SqliteTable`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file
    pub path: PathBuf,
    /// Table shape
    #[serde(default)]
    pub layout: TableLayout,
    /// How long a statement waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode
    #[serde(default)]
    pub journal_mode: JournalMode,
    /// Sync mode
    #[serde(default)]
    pub sync_mode: SyncMode,
    /// Field-map codec identifier
    #[serde(default = "default_codec")]
    pub codec: String,
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_codec() -> String {
    "json".to_string()
}

impl SqliteConfig {
    /// Config for `path` with default settings
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SqliteConfig {
            path: path.into(),
            layout: TableLayout::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
            codec: default_codec(),
        }
    }

    /// Set the table layout (builder style)
    pub fn layout(mut self, layout: TableLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the journal mode (builder style)
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Set the sync mode (builder style)
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Set the busy timeout (builder style)
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

/// Durable [`VersionTable`] backed by one SQLite connection
///
/// The connection is serialized behind a mutex. `close` drops it; later
/// calls fail with [`Error::Closed`].
pub struct SqliteTable {
    conn: Mutex<Option<Connection>>,
    layout: TableLayout,
    codec: Arc<dyn FieldCodec>,
    path: Option<PathBuf>,
}

impl SqliteTable {
    /// Open (or create) the database file described by `config`
    ///
    /// Creates the `records` table when missing. Fails with
    /// `InvalidInput` when an existing table has the other layout.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let codec: Arc<dyn FieldCodec> = Arc::from(get_codec(&config.codec)?);
        Self::open_with_codec(config, codec)
    }

    /// Open with a caller-supplied codec
    pub fn open_with_codec(config: &SqliteConfig, codec: Arc<dyn FieldCodec>) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let mut conn = Connection::open_with_flags(&config.path, flags)
            .map_err(|e| Error::storage_with(format!("open {}", config.path.display()), e))?;
        apply_pragmas(&conn, config)?;
        initialize_schema(&mut conn, config.layout)?;

        info!(
            target: "timetravel::sqlite",
            path = %config.path.display(),
            layout = %config.layout,
            codec = codec.codec_id(),
            "opened record table"
        );

        Ok(SqliteTable {
            conn: Mutex::new(Some(conn)),
            layout: config.layout,
            codec,
            path: Some(config.path.clone()),
        })
    }

    /// Private in-memory database, mainly for tests
    pub fn in_memory(layout: TableLayout) -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| Error::storage_with("open in-memory database", e))?;
        initialize_schema(&mut conn, layout)?;
        Ok(SqliteTable {
            conn: Mutex::new(Some(conn)),
            layout,
            codec: Arc::from(get_codec("json")?),
            path: None,
        })
    }

    /// Database file, `None` for in-memory tables
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `op` on the connection with cancellation wired in
    fn with_conn<T>(
        &self,
        ctx: &OpContext,
        op: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        ctx.checkpoint()?;
        let guard = match ctx.deadline() {
            Some(deadline) => self.conn.try_lock_until(deadline).ok_or(Error::Cancelled)?,
            None => self.conn.lock(),
        };
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        ctx.checkpoint()?;

        if !ctx.is_cancellable() {
            return op(conn);
        }
        let watched = ctx.clone();
        conn.progress_handler(PROGRESS_OPS, Some(move || watched.is_done()));
        let result = op(conn);
        conn.progress_handler(0, None::<fn() -> bool>);
        result
    }

    fn encode(&self, fields: &Fields) -> Result<String> {
        Ok(self.codec.encode(fields)?)
    }

    fn decode_row(&self, id: RecordId, data: &str, ver: i64) -> Result<Record> {
        let version = Version::try_from(ver)
            .map_err(|_| Error::storage(format!("corrupt version {} for record {}", ver, id)))?;
        Ok(Record::new(id, version, self.codec.decode(data)?))
    }

    fn check_version(&self, version: Version) -> Result<()> {
        if self.layout == TableLayout::Legacy && !version.is_first() {
            return Err(Error::invalid_input(format!(
                "legacy table only stores version 1, got {}",
                version
            )));
        }
        Ok(())
    }

    fn write(
        &self,
        ctx: &OpContext,
        id: RecordId,
        version: Version,
        fields: &Fields,
        verb: &str,
    ) -> Result<usize> {
        self.check_version(version)?;
        let data = self.encode(fields)?;
        let changed = self.with_conn(ctx, |conn| {
            let result = match self.layout {
                TableLayout::Versioned => conn.execute(
                    &format!("INSERT OR {} INTO records (id, data, ver) VALUES (?1, ?2, ?3)", verb),
                    params![id.as_i64(), data, version.as_i64()],
                ),
                TableLayout::Legacy => conn.execute(
                    &format!("INSERT OR {} INTO records (id, data) VALUES (?1, ?2)", verb),
                    params![id.as_i64(), data],
                ),
            };
            result.map_err(sqlite_error)
        })?;
        Ok(changed)
    }
}

impl std::fmt::Debug for SqliteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTable")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .field("codec", &self.codec.codec_id())
            .finish()
    }
}

impl VersionTable for SqliteTable {
    fn layout(&self) -> TableLayout {
        self.layout
    }

    fn put(&self, ctx: &OpContext, id: RecordId, version: Version, fields: &Fields) -> Result<()> {
        self.write(ctx, id, version, fields, "REPLACE")?;
        debug!(target: "timetravel::sqlite", %id, %version, "put row");
        Ok(())
    }

    fn insert(
        &self,
        ctx: &OpContext,
        id: RecordId,
        version: Version,
        fields: &Fields,
    ) -> Result<bool> {
        let inserted = self.write(ctx, id, version, fields, "IGNORE")? > 0;
        if inserted {
            debug!(target: "timetravel::sqlite", %id, %version, "inserted row");
        }
        Ok(inserted)
    }

    fn append_after(
        &self,
        ctx: &OpContext,
        base: &Record,
        version: Version,
        fields: &Fields,
    ) -> Result<bool> {
        self.check_version(version)?;
        if self.layout == TableLayout::Legacy {
            // version 1 is the only row and it is never vacant after a read
            ctx.checkpoint()?;
            return Ok(false);
        }
        // The codec is deterministic, so equal maps have equal encodings.
        let expected = self.encode(&base.fields)?;
        let data = self.encode(fields)?;
        let inserted = self.with_conn(ctx, |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO records (id, data, ver) \
                 SELECT ?1, ?2, ?3 \
                 WHERE EXISTS (SELECT 1 FROM records WHERE id = ?1 AND ver = ?4 AND data = ?5) \
                 AND NOT EXISTS (SELECT 1 FROM records WHERE id = ?1 AND ver > ?4)",
                params![
                    base.id.as_i64(),
                    data,
                    version.as_i64(),
                    base.version.as_i64(),
                    expected
                ],
            )
            .map_err(sqlite_error)
        })? > 0;
        if inserted {
            debug!(target: "timetravel::sqlite", id = %base.id, %version, "appended row");
        }
        Ok(inserted)
    }

    fn replace_latest(&self, ctx: &OpContext, base: &Record, fields: &Fields) -> Result<bool> {
        let expected = self.encode(&base.fields)?;
        let data = self.encode(fields)?;
        let replaced = self.with_conn(ctx, |conn| {
            let result = match self.layout {
                TableLayout::Versioned => conn.execute(
                    "UPDATE records SET data = ?1 \
                     WHERE id = ?2 AND ver = ?3 AND data = ?4 \
                     AND NOT EXISTS (SELECT 1 FROM records WHERE id = ?2 AND ver > ?3)",
                    params![data, base.id.as_i64(), base.version.as_i64(), expected],
                ),
                TableLayout::Legacy if base.version.is_first() => conn.execute(
                    "UPDATE records SET data = ?1 WHERE id = ?2 AND data = ?3",
                    params![data, base.id.as_i64(), expected],
                ),
                TableLayout::Legacy => Ok(0),
            };
            result.map_err(sqlite_error)
        })? > 0;
        if replaced {
            debug!(
                target: "timetravel::sqlite",
                id = %base.id,
                version = %base.version,
                "replaced latest row"
            );
        }
        Ok(replaced)
    }

    fn get(&self, ctx: &OpContext, id: RecordId, version: Version) -> Result<Option<Record>> {
        if self.layout == TableLayout::Legacy && !version.is_first() {
            ctx.checkpoint()?;
            return Ok(None);
        }
        let data: Option<String> = self.with_conn(ctx, |conn| {
            let result = match self.layout {
                TableLayout::Versioned => conn
                    .query_row(
                        "SELECT data FROM records WHERE id = ?1 AND ver = ?2",
                        params![id.as_i64(), version.as_i64()],
                        |row| row.get::<_, String>(0),
                    )
                    .optional(),
                TableLayout::Legacy => conn
                    .query_row(
                        "SELECT data FROM records WHERE id = ?1",
                        params![id.as_i64()],
                        |row| row.get::<_, String>(0),
                    )
                    .optional(),
            };
            result.map_err(sqlite_error)
        })?;
        data.map(|data| {
            let fields = self.codec.decode(&data)?;
            Ok::<_, Error>(Record::new(id, version, fields))
        })
        .transpose()
    }

    fn get_latest(&self, ctx: &OpContext, id: RecordId) -> Result<Option<Record>> {
        let row: Option<(String, i64)> = self.with_conn(ctx, |conn| {
            let sql = match self.layout {
                TableLayout::Versioned => {
                    "SELECT data, ver FROM records WHERE id = ?1 ORDER BY ver DESC LIMIT 1"
                }
                TableLayout::Legacy => "SELECT data, 1 FROM records WHERE id = ?1",
            };
            conn.query_row(sql, params![id.as_i64()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()
            .map_err(sqlite_error)
        })?;
        row.map(|(data, ver)| self.decode_row(id, &data, ver))
            .transpose()
    }

    fn latest_version(&self, ctx: &OpContext, id: RecordId) -> Result<Option<Version>> {
        let ver: Option<i64> = self.with_conn(ctx, |conn| {
            let sql = match self.layout {
                TableLayout::Versioned => "SELECT MAX(ver) FROM records WHERE id = ?1",
                TableLayout::Legacy => "SELECT 1 FROM records WHERE id = ?1",
            };
            // MAX over no rows yields a single NULL row
            conn.query_row(sql, params![id.as_i64()], |row| row.get::<_, Option<i64>>(0))
                .optional()
                .map(Option::flatten)
                .map_err(sqlite_error)
        })?;
        ver.map(|v| {
            Version::try_from(v)
                .map_err(|_| Error::storage(format!("corrupt version {} for record {}", v, id)))
        })
        .transpose()
    }

    fn history(&self, ctx: &OpContext, id: RecordId) -> Result<Vec<Record>> {
        let rows: Vec<(String, i64)> = self.with_conn(ctx, |conn| {
            let sql = match self.layout {
                TableLayout::Versioned => {
                    "SELECT data, ver FROM records WHERE id = ?1 ORDER BY ver DESC"
                }
                TableLayout::Legacy => "SELECT data, 1 FROM records WHERE id = ?1",
            };
            let mut stmt = conn.prepare_cached(sql).map_err(sqlite_error)?;
            let rows = stmt
                .query_map(params![id.as_i64()], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(sqlite_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sqlite_error)
        })?;
        rows.iter()
            .map(|(data, ver)| self.decode_row(id, data, *ver))
            .collect()
    }

    fn delete(&self, ctx: &OpContext, id: RecordId, version: Version) -> Result<bool> {
        if self.layout == TableLayout::Legacy && !version.is_first() {
            ctx.checkpoint()?;
            return Ok(false);
        }
        let affected = self.with_conn(ctx, |conn| {
            let result = match self.layout {
                TableLayout::Versioned => conn.execute(
                    "DELETE FROM records WHERE id = ?1 AND ver = ?2",
                    params![id.as_i64(), version.as_i64()],
                ),
                TableLayout::Legacy => {
                    conn.execute("DELETE FROM records WHERE id = ?1", params![id.as_i64()])
                }
            };
            result.map_err(sqlite_error)
        })?;
        if affected > 0 {
            debug!(target: "timetravel::sqlite", %id, %version, "deleted row");
        }
        Ok(affected > 0)
    }

    fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close()
            .map_err(|(_, e)| Error::storage_with("close database", e))?;
        info!(target: "timetravel::sqlite", path = ?self.path, "closed record table");
        Ok(())
    }
}

/// Classify a SQLite error; interrupts raised by the progress handler are
/// cancellations, everything else is a storage failure.
fn sqlite_error(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::OperationInterrupted =>
        {
            Error::Cancelled
        }
        _ => Error::storage_with("sqlite statement failed", err),
    }
}

fn apply_pragmas(conn: &Connection, config: &SqliteConfig) -> Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = {};",
        config.journal_mode.pragma_value()
    ))
    .map_err(sqlite_error)?;
    conn.execute_batch(&format!(
        "PRAGMA synchronous = {};",
        config.sync_mode.pragma_value()
    ))
    .map_err(sqlite_error)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(sqlite_error)?;
    Ok(())
}

/// Create the `records` table, or check that the existing one has `layout`
fn initialize_schema(conn: &mut Connection, layout: TableLayout) -> Result<()> {
    let tx = conn.transaction().map_err(sqlite_error)?;
    let columns: Vec<String> = {
        let mut stmt = tx
            .prepare("SELECT name FROM pragma_table_info('records')")
            .map_err(sqlite_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sqlite_error)?;
        names
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(sqlite_error)?
    };

    if columns.is_empty() {
        let ddl = match layout {
            TableLayout::Versioned => {
                "CREATE TABLE records (
                    id INTEGER NOT NULL,
                    data TEXT NOT NULL,
                    ver INTEGER NOT NULL,
                    PRIMARY KEY (id, ver)
                );"
            }
            TableLayout::Legacy => {
                "CREATE TABLE records (
                    id INTEGER PRIMARY KEY,
                    data TEXT NOT NULL
                );"
            }
        };
        tx.execute_batch(ddl).map_err(sqlite_error)?;
    } else {
        let found = if columns.iter().any(|c| c == "ver") {
            TableLayout::Versioned
        } else {
            TableLayout::Legacy
        };
        if found != layout {
            return Err(Error::invalid_input(format!(
                "records table has {} layout, expected {}",
                found, layout
            )));
        }
    }
    tx.commit().map_err(sqlite_error)
}
