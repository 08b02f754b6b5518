//! Networked PostgreSQL backend
//!
//! - Bounded pool with max-lifetime recycling and an acquire timeout
//! - Optional TLS through rustls with the webpki root store
//! - Synchronous facade over tokio-postgres

pub mod config;
pub mod pool;

pub use config::PostgresConfig;
pub use pool::{PgConnection, PooledConnection, PostgresManager, PostgresPool};

use tokio::runtime::Runtime;
use tokio_postgres::types::ToSql;

use crate::value::{SqlRow, SqlValue, row_from_postgres};

fn param_refs(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

pub(crate) fn execute(
    runtime: &Runtime,
    conn: &PgConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<u64, tokio_postgres::Error> {
    let refs = param_refs(params);
    runtime.block_on(conn.client.execute(sql, &refs))
}

pub(crate) fn query(
    runtime: &Runtime,
    conn: &PgConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<Vec<SqlRow>, tokio_postgres::Error> {
    let refs = param_refs(params);
    let rows = runtime.block_on(conn.client.query(sql, &refs))?;
    rows.iter().map(row_from_postgres).collect()
}

pub(crate) fn execute_batch(
    runtime: &Runtime,
    conn: &PgConnection,
    sql: &str,
) -> Result<(), tokio_postgres::Error> {
    runtime.block_on(conn.client.batch_execute(sql))
}
