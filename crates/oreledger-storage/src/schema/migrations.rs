//! Ordered schema upgrade steps
//!
//! Steps are append-only: a released step is never edited, a schema change
//! ships as a new step plus a bumped [`Table::current_version`].

use oreledger_core::error::{StorageError, StorageOperation};

use super::{SchemaContext, Table};
use crate::dialect::Query;
use crate::provider::Connection;

/// Moves one table from version `from` to the version it returns.
pub struct MigrationStep {
    pub table: Table,
    pub from: u32,
    pub description: &'static str,
    pub apply: fn(&mut Connection, &SchemaContext<'_>) -> Result<u32, StorageError>,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("table", &self.table)
            .field("from", &self.from)
            .field("description", &self.description)
            .finish()
    }
}

pub static MIGRATIONS: &[MigrationStep] = &[
    MigrationStep {
        table: Table::Players,
        from: 1,
        description: "Add last known player name",
        apply: players_add_name,
    },
    MigrationStep {
        table: Table::Blocks,
        from: 1,
        description: "Rebuild with (player, material_name) primary key",
        apply: blocks_composite_key,
    },
];

/// Steps for `table`, ascending by source version.
pub fn steps_for(table: Table) -> impl Iterator<Item = &'static MigrationStep> {
    let mut steps: Vec<&'static MigrationStep> =
        MIGRATIONS.iter().filter(|s| s.table == table).collect();
    steps.sort_by_key(|s| s.from);
    steps.into_iter()
}

fn count(
    conn: &mut Connection,
    ctx: &SchemaContext<'_>,
    query: Query,
    params: &[crate::value::SqlValue],
) -> Result<i64, StorageError> {
    Ok(conn
        .query_opt(StorageOperation::Migrate, ctx.dialect.statement(query), params)?
        .and_then(|row| row.integer("total"))
        .unwrap_or(0))
}

pub(crate) fn table_exists(
    conn: &mut Connection,
    ctx: &SchemaContext<'_>,
    table: Table,
) -> Result<bool, StorageError> {
    Ok(count(conn, ctx, Query::TableExists, &[ctx.table_name(table).into()])? > 0)
}

pub(crate) fn column_exists(
    conn: &mut Connection,
    ctx: &SchemaContext<'_>,
    table: Table,
    column: &str,
) -> Result<bool, StorageError> {
    Ok(count(
        conn,
        ctx,
        Query::ColumnExists,
        &[ctx.table_name(table).into(), column.into()],
    )? > 0)
}

fn players_add_name(conn: &mut Connection, ctx: &SchemaContext<'_>) -> Result<u32, StorageError> {
    if column_exists(conn, ctx, Table::Players, "name")? {
        tracing::debug!(table = %ctx.table_name(Table::Players), "Column 'name' already present");
    } else {
        conn.execute_batch(
            StorageOperation::Migrate,
            &ctx.dialect.format_generic(
                "ALTER TABLE {table_players} ADD COLUMN name VARCHAR(32) NOT NULL DEFAULT ''",
            ),
        )?;
    }
    Ok(2)
}

// Version 1 allowed several rows per (player, material); the highest count
// is the one kept.
fn blocks_composite_key(
    conn: &mut Connection,
    ctx: &SchemaContext<'_>,
) -> Result<u32, StorageError> {
    let create = ctx
        .definition
        .create_statement(Table::Blocks)
        .replace("{table_blocks}", "{table_blocks}_rebuild");

    let copy = "INSERT INTO {table_blocks}_rebuild (player, material_name, destroyed) \
                SELECT player, material_name, MAX(destroyed) FROM {table_blocks} \
                WHERE player IS NOT NULL AND material_name IS NOT NULL \
                GROUP BY player, material_name;\n\
                DROP TABLE {table_blocks};\n\
                ALTER TABLE {table_blocks}_rebuild RENAME TO {table_blocks}";

    conn.execute_batch(StorageOperation::Migrate, &ctx.dialect.format_generic(&create))?;
    conn.execute_batch(StorageOperation::Migrate, &ctx.dialect.format_generic(copy))?;
    Ok(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_unique_per_source_version() {
        for table in Table::ALL {
            let froms: Vec<u32> = steps_for(table).map(|s| s.from).collect();
            let mut deduped = froms.clone();
            deduped.dedup();
            assert_eq!(froms, deduped, "{table} has duplicate steps");
        }
    }

    #[test]
    fn steps_reach_current_version() {
        for table in Table::ALL {
            let mut version = 1;
            for step in steps_for(table) {
                assert_eq!(step.from, version, "{table} has a gap before {}", step.from);
                version += 1;
            }
            assert_eq!(version, table.current_version(), "{table} cannot reach current");
        }
    }
}
