//! Store configuration via `timetravel.toml`
//!
//! A store is described by a small config file. Missing keys take their
//! defaults, so an empty file opens a versioned SQLite store at `records.db`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use timetravel_core::{Error, Result, TableLayout};
use timetravel_storage::{get_codec, JournalMode, SqliteConfig, SyncMode};

use crate::retry::RetryPolicy;

/// Config file name placed next to the database.
pub const CONFIG_FILE_NAME: &str = "timetravel.toml";

/// Which version table backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SQLite file at `path`
    #[default]
    Sqlite,
    /// Process memory; nothing survives the store
    Memory,
}

/// Store configuration loaded from `timetravel.toml`.
///
/// # Example
///
/// ```toml
/// backend = "sqlite"
/// path = "records.db"
/// layout = "versioned"
///
/// [retry]
/// max_retries = 3
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend: `"sqlite"` or `"memory"`.
    #[serde(default)]
    pub backend: Backend,
    /// SQLite database file. Ignored by the memory backend.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Table layout: `"versioned"` or `"legacy"`.
    #[serde(default)]
    pub layout: TableLayout,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// SQLite journal mode: `"wal"` or `"delete"`.
    #[serde(default)]
    pub journal_mode: JournalMode,
    /// SQLite sync mode: `"full"` or `"normal"`.
    #[serde(default)]
    pub sync_mode: SyncMode,
    /// Field-map codec for the `data` column.
    #[serde(default = "default_codec")]
    pub codec: String,
    /// How long shutdown waits for in-flight calls, in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Backoff for conflicting appends.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_path() -> PathBuf {
    PathBuf::from("records.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_codec() -> String {
    "json".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: default_path(),
            layout: TableLayout::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
            codec: default_codec(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// SQLite store at `path` with default settings
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// In-memory store with default settings
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory,
            ..Default::default()
        }
    }

    /// Set the table layout (builder style)
    pub fn with_layout(mut self, layout: TableLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the retry policy (builder style)
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the shutdown drain timeout (builder style)
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Shutdown drain timeout
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Settings for the SQLite table
    pub fn sqlite_config(&self) -> SqliteConfig {
        SqliteConfig {
            path: self.path.clone(),
            layout: self.layout,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            codec: self.codec.clone(),
        }
    }

    /// Check values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.backend == Backend::Sqlite && self.path.as_os_str().is_empty() {
            return Err(Error::invalid_input(
                "path must not be empty for the sqlite backend",
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::invalid_input(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        get_codec(&self.codec)?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Timetravel record store configuration
#
# Backend: "sqlite" (default) or "memory"
backend = "sqlite"

# SQLite database file
path = "records.db"

# Table layout: "versioned" (default) or "legacy"
#   "versioned" = every update appends a new version, history is kept
#   "legacy"    = one row per record, updates overwrite it
# The layout of an existing file cannot be changed.
layout = "versioned"

# SQLite tuning
busy_timeout_ms = 5000
journal_mode = "wal"     # "wal" or "delete"
sync_mode = "full"       # "full" or "normal"

# Field-map encoding of the data column
codec = "json"

# How long shutdown waits for in-flight operations (ms)
shutdown_timeout_ms = 30000

# Backoff when another writer claims the same version first
[retry]
max_retries = 3
base_delay_ms = 10
max_delay_ms = 100
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::storage_with(format!("failed to read config file '{}'", path.display()), e)
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_input(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::storage_with(
                    format!("failed to write default config file '{}'", path.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::invalid_input(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::storage_with(format!("failed to write config file '{}'", path.display()), e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_versioned_sqlite() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.layout, TableLayout::Versioned);
        assert_eq!(config.path, PathBuf::from("records.db"));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn default_toml_matches_default() {
        let config: StoreConfig = toml::from_str(StoreConfig::default_toml()).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "").unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn parse_legacy_memory() {
        let config: StoreConfig =
            toml::from_str("backend = \"memory\"\nlayout = \"legacy\"").unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.layout, TableLayout::Legacy);
    }

    #[test]
    fn parse_partial_retry_table() {
        let config: StoreConfig = toml::from_str("[retry]\nmax_retries = 7\n").unwrap();
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.base_delay_ms, 10);
    }

    #[test]
    fn unknown_layout_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "layout = \"sideways\"\n").unwrap();

        let err = StoreConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = StoreConfig::sqlite("");
        assert!(config.validate().is_err());

        config = StoreConfig::default();
        config.retry.base_delay_ms = 500;
        assert!(config.validate().is_err());

        config = StoreConfig::default();
        config.codec = "yaml".to_string();
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));

        assert!(StoreConfig::memory().with_layout(TableLayout::Legacy).validate().is_ok());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = StoreConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.is_storage_failure());
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "layout = \"legacy\"\n").unwrap();
        StoreConfig::write_default_if_missing(&path).unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.layout, TableLayout::Legacy);
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(StoreConfig::from_file(&path).unwrap(), StoreConfig::default());
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let config = StoreConfig::sqlite(dir.path().join("data.db"))
            .with_layout(TableLayout::Legacy)
            .with_retry(RetryPolicy::no_retry())
            .with_shutdown_timeout(Duration::from_millis(250));
        config.write_to_file(&path).unwrap();

        let loaded = StoreConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.sqlite_config().path,
            dir.path().join("data.db")
        );
    }
}
