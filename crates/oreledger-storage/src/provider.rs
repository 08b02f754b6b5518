//! Connection provider
//!
//! [`ConnectionProvider`] hides which backend pool is in use; the
//! [`Connection`] it hands out runs statements against either driver and
//! goes back to its pool when dropped.

use std::sync::Arc;

use oreledger_core::error::{BackendKind, StorageError, StorageOperation};

use crate::pool::PoolHealth;
use crate::postgres::{self, PostgresManager, PostgresPool};
use crate::settings::BackendConfig;
use crate::sqlite::{self, SqliteManager, SqlitePool};
use crate::value::{SqlRow, SqlValue};

/// Pool for whichever backend the settings selected.
#[derive(Clone)]
pub enum ConnectionProvider {
    Sqlite(Arc<SqlitePool>),
    Postgres(Arc<PostgresPool>),
}

impl ConnectionProvider {
    pub fn open(config: &BackendConfig) -> Result<Self, StorageError> {
        let provider = match config {
            BackendConfig::Sqlite(config) => {
                ConnectionProvider::Sqlite(sqlite::pool::open(config.clone())?)
            }
            BackendConfig::Postgres(config) => {
                ConnectionProvider::Postgres(postgres::pool::open(config)?)
            }
        };
        tracing::info!(backend = %provider.kind(), "Connection provider opened");
        Ok(provider)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            ConnectionProvider::Sqlite(_) => BackendKind::Sqlite,
            ConnectionProvider::Postgres(_) => BackendKind::Postgres,
        }
    }

    /// Check out a connection; it is returned when the guard drops.
    pub fn acquire(&self) -> Result<Connection, StorageError> {
        Ok(match self {
            ConnectionProvider::Sqlite(pool) => Connection::Sqlite(pool.acquire()?),
            ConnectionProvider::Postgres(pool) => Connection::Postgres(pool.acquire()?),
        })
    }

    pub fn health(&self) -> Result<PoolHealth, StorageError> {
        match self {
            ConnectionProvider::Sqlite(pool) => pool.health(),
            ConnectionProvider::Postgres(pool) => pool.health(),
        }
    }
}

/// A checked-out connection to either backend.
pub enum Connection {
    Sqlite(sqlite::PooledConnection),
    Postgres(postgres::PooledConnection),
}

impl Connection {
    pub fn kind(&self) -> BackendKind {
        match self {
            Connection::Sqlite(_) => BackendKind::Sqlite,
            Connection::Postgres(_) => BackendKind::Postgres,
        }
    }

    fn sqlite_error(operation: StorageOperation, error: &rusqlite::Error) -> StorageError {
        StorageError::statement_failed(
            BackendKind::Sqlite,
            operation,
            SqliteManager::sanitize_error(error),
        )
    }

    fn postgres_error(operation: StorageOperation, error: &tokio_postgres::Error) -> StorageError {
        StorageError::StatementFailed {
            backend: BackendKind::Postgres,
            operation,
            kind: PostgresManager::classify_error(error),
        }
    }

    /// Run a statement and return the number of affected rows.
    pub fn execute(
        &mut self,
        operation: StorageOperation,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, StorageError> {
        match self {
            Connection::Sqlite(conn) => {
                sqlite::execute(conn, sql, params).map_err(|e| Self::sqlite_error(operation, &e))
            }
            Connection::Postgres(conn) => {
                postgres::execute(conn.manager().runtime(), conn, sql, params)
                    .map_err(|e| Self::postgres_error(operation, &e))
            }
        }
    }

    /// Run a query and collect every row.
    pub fn query(
        &mut self,
        operation: StorageOperation,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, StorageError> {
        match self {
            Connection::Sqlite(conn) => {
                sqlite::query(conn, sql, params).map_err(|e| Self::sqlite_error(operation, &e))
            }
            Connection::Postgres(conn) => {
                postgres::query(conn.manager().runtime(), conn, sql, params)
                    .map_err(|e| Self::postgres_error(operation, &e))
            }
        }
    }

    /// First row of a query, if any.
    pub fn query_opt(
        &mut self,
        operation: StorageOperation,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<SqlRow>, StorageError> {
        Ok(self.query(operation, sql, params)?.into_iter().next())
    }

    /// Run one or more parameterless statements separated by `;`.
    pub fn execute_batch(
        &mut self,
        operation: StorageOperation,
        sql: &str,
    ) -> Result<(), StorageError> {
        match self {
            Connection::Sqlite(conn) => conn
                .execute_batch(sql)
                .map_err(|e| Self::sqlite_error(operation, &e)),
            Connection::Postgres(conn) => {
                postgres::execute_batch(conn.manager().runtime(), conn, sql)
                    .map_err(|e| Self::postgres_error(operation, &e))
            }
        }
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`.
    pub fn in_transaction<T>(
        &mut self,
        operation: StorageOperation,
        f: impl FnOnce(&mut Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.execute_batch(operation, "BEGIN")?;
        match f(self) {
            Ok(value) => {
                self.execute_batch(operation, "COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.execute_batch(operation, "ROLLBACK") {
                    tracing::error!(
                        backend = %self.kind(),
                        error = %rollback,
                        "Rollback failed"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteConfig;
    use tempfile::tempdir;

    fn provider(dir: &std::path::Path) -> ConnectionProvider {
        ConnectionProvider::open(&BackendConfig::Sqlite(SqliteConfig::new(dir.join("p.db"))))
            .unwrap()
    }

    #[test]
    fn connection_returns_to_pool_on_drop() {
        let dir = tempdir().unwrap();
        let provider = provider(dir.path());
        {
            let _conn = provider.acquire().unwrap();
            assert_eq!(provider.health().unwrap().active, 1);
        }
        let health = provider.health().unwrap();
        assert_eq!(health.active, 0);
        assert_eq!(health.available, 1);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let dir = tempdir().unwrap();
        let provider = provider(dir.path());
        let mut conn = provider.acquire().unwrap();
        conn.execute_batch(StorageOperation::Migrate, "CREATE TABLE t (n INTEGER)")
            .unwrap();

        let result: Result<(), StorageError> =
            conn.in_transaction(StorageOperation::Migrate, |conn| {
                conn.execute(StorageOperation::Migrate, "INSERT INTO t VALUES (?)", &[1u32.into()])?;
                conn.execute(StorageOperation::Migrate, "INSERT INTO missing VALUES (1)", &[])?;
                Ok(())
            });
        assert!(matches!(
            result,
            Err(StorageError::StatementFailed {
                backend: BackendKind::Sqlite,
                ..
            })
        ));

        let rows = conn
            .query(StorageOperation::Migrate, "SELECT COUNT(*) AS n FROM t", &[])
            .unwrap();
        assert_eq!(rows[0].integer("n"), Some(0));
    }

    #[test]
    fn committed_transaction_is_visible() {
        let dir = tempdir().unwrap();
        let provider = provider(dir.path());
        let mut conn = provider.acquire().unwrap();
        conn.execute_batch(StorageOperation::Migrate, "CREATE TABLE t (n INTEGER)")
            .unwrap();
        let changed = conn
            .in_transaction(StorageOperation::Migrate, |conn| {
                conn.execute(StorageOperation::Migrate, "INSERT INTO t VALUES (?)", &[5u32.into()])
            })
            .unwrap();
        assert_eq!(changed, 1);

        let row = conn
            .query_opt(StorageOperation::Migrate, "SELECT n FROM t", &[])
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("n"), Some(5));
        assert!(
            conn.query_opt(StorageOperation::Migrate, "SELECT n FROM t WHERE n = 9", &[])
                .unwrap()
                .is_none()
        );
    }
}
