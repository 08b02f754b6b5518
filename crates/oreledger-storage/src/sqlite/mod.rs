//! Embedded SQLite backend
//!
//! One WAL-mode file handle shared through a pool of size one; statements
//! are prepared through rusqlite's statement cache.

pub mod pool;

pub use pool::{PooledConnection, SqliteConfig, SqliteManager, SqlitePool};

use rusqlite::params_from_iter;

use crate::value::{SqlRow, SqlValue};

pub(crate) fn execute(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[SqlValue],
) -> rusqlite::Result<u64> {
    let mut stmt = conn.prepare_cached(sql)?;
    let changed = stmt.execute(params_from_iter(params.iter()))?;
    Ok(changed as u64)
}

pub(crate) fn query(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[SqlValue],
) -> rusqlite::Result<Vec<SqlRow>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        (0..columns.len())
            .map(|i| row.get_ref(i).map(SqlValue::from))
            .collect::<rusqlite::Result<Vec<_>>>()
    })?;

    rows.map(|values| values.map(|values| SqlRow::new(columns.clone(), values)))
        .collect()
}
