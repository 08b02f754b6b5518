//! Single-handle SQLite pool with WAL mode

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use oreledger_core::error::{BackendKind, StorageError, StorageErrorKind};
use rusqlite::Connection;

use crate::pool::{ConnectionManager, Pool, Pooled};

/// Settings for the embedded backend.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file; parent directories are created on open.
    pub path: PathBuf,
    pub busy_timeout: Duration,
    pub acquire_timeout: Duration,
    pub cache_size_kb: i32,
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(5000),
            acquire_timeout: Duration::from_millis(10_000),
            cache_size_kb: 16 * 1024,
        }
    }
}

/// Opens SQLite connections for a [`Pool`].
pub struct SqliteManager {
    path: PathBuf,
    config: SqliteConfig,
}

pub type SqlitePool = Pool<SqliteManager>;
pub type PooledConnection = Pooled<SqliteManager>;

impl SqliteManager {
    /// Validate database path for security (prevent path traversal attacks)
    fn validate_database_path(path: &Path) -> Result<PathBuf, StorageError> {
        let invalid = |reason: &str| {
            StorageError::config(format!("Invalid SQLite database path: {}", reason))
        };

        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(invalid("path traversal detected"));
        }

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("db" | "sqlite" | "sqlite3") => Ok(path.to_path_buf()),
            Some(_) => Err(invalid("only .db, .sqlite, and .sqlite3 files allowed")),
            None => Err(invalid("file extension required")),
        }
    }

    pub(crate) fn sanitize_error(error: &rusqlite::Error) -> String {
        use oreledger_core::sanitization::DatabaseErrorSanitizer;

        match error {
            rusqlite::Error::QueryReturnedNoRows => "No rows returned".to_string(),
            rusqlite::Error::InvalidColumnIndex(_) => "Invalid column index".to_string(),
            rusqlite::Error::InvalidColumnName(_) => "Invalid column name".to_string(),
            rusqlite::Error::InvalidPath(_) => "Invalid database path".to_string(),
            rusqlite::Error::InvalidColumnType(_, _, _) => "Invalid column type".to_string(),
            rusqlite::Error::IntegralValueOutOfRange(_, _) => "Value out of range".to_string(),
            _ => DatabaseErrorSanitizer::sanitize(error),
        }
    }

    pub fn new(config: SqliteConfig) -> Result<Self, StorageError> {
        let path = Self::validate_database_path(&config.path)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::connection_failed(
                    BackendKind::Sqlite,
                    StorageErrorKind::IoError {
                        details: format!("Failed to create database directory: {}", e),
                    },
                )
            })?;
        }
        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionManager for SqliteManager {
    type Connection = Connection;

    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn connect(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.path).map_err(|e| {
            StorageError::connection_failed(
                BackendKind::Sqlite,
                StorageErrorKind::IoError {
                    details: Self::sanitize_error(&e),
                },
            )
        })?;

        let pragmas = [
            "PRAGMA journal_mode = WAL;".to_string(),
            "PRAGMA synchronous = NORMAL;".to_string(),
            format!("PRAGMA cache_size = -{};", self.config.cache_size_kb),
            format!(
                "PRAGMA busy_timeout = {};",
                self.config.busy_timeout.as_millis()
            ),
        ];
        conn.execute_batch(&pragmas.join("\n")).map_err(|e| {
            StorageError::connection_failed(
                BackendKind::Sqlite,
                StorageErrorKind::InternalError {
                    backend_error: format!("Failed to configure SQLite: {}", Self::sanitize_error(&e)),
                },
            )
        })?;

        tracing::debug!(path = ?self.path, "Opened SQLite database");
        Ok(conn)
    }
}

/// Open the single-handle pool for `config`.
pub fn open(config: SqliteConfig) -> Result<Arc<SqlitePool>, StorageError> {
    let acquire_timeout = config.acquire_timeout;
    let manager = SqliteManager::new(config)?;
    tracing::debug!(path = %manager.path().display(), "Opening SQLite database");
    Ok(Pool::new(manager, 1, acquire_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn opens_in_wal_mode() {
        let dir = tempdir().unwrap();
        let pool = open(SqliteConfig::new(dir.path().join("wal.db"))).unwrap();
        let conn = pool.acquire().unwrap();

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plugins").join("OreLedger").join("database.db");
        let pool = open(SqliteConfig::new(&path)).unwrap();
        drop(pool.acquire().unwrap());
        assert!(path.exists());
        assert_eq!(pool.manager().path(), path.as_path());
    }

    #[test]
    fn rejects_bad_paths() {
        assert!(matches!(
            open(SqliteConfig::new("../escape.db")),
            Err(StorageError::Config { .. })
        ));
        assert!(matches!(
            open(SqliteConfig::new("database.txt")),
            Err(StorageError::Config { .. })
        ));
        assert!(matches!(
            open(SqliteConfig::new("database")),
            Err(StorageError::Config { .. })
        ));
    }

    #[test]
    fn pool_holds_a_single_handle() {
        let dir = tempdir().unwrap();
        let mut config = SqliteConfig::new(dir.path().join("single.db"));
        config.acquire_timeout = Duration::from_millis(20);
        let pool = open(config).unwrap();

        let _held = pool.acquire().unwrap();
        assert_eq!(pool.health().unwrap().total, 1);
        assert!(pool.acquire().is_err());
    }
}
