//! Upgrade manager
//!
//! Brings every table to its current version at startup. Each step runs in
//! its own transaction together with its version bump, so a failure leaves
//! the previous version recorded and a later run resumes from there.

use oreledger_core::error::{StorageError, StorageOperation};
use serde::Serialize;

use super::migrations::{self, MigrationStep};
use super::{SchemaContext, SchemaDefinition, Table};
use crate::dialect::{Dialect, Query};
use crate::provider::Connection;

/// Lifecycle of one table during an upgrade run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Uninitialized,
    Upgrading { table: Table, from: u32 },
    Current,
}

/// What happened to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum MigrationOutcome {
    Created { version: u32 },
    Upgraded { from: u32, to: u32 },
    Unchanged { version: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: Table,
    #[serde(flatten)]
    pub outcome: MigrationOutcome,
}

/// Result of one [`UpgradeManager::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub tables: Vec<TableReport>,
}

impl MigrationReport {
    /// Whether the run created or upgraded anything.
    pub fn changed(&self) -> bool {
        self.tables
            .iter()
            .any(|t| !matches!(t.outcome, MigrationOutcome::Unchanged { .. }))
    }

    pub fn outcome(&self, table: Table) -> Option<MigrationOutcome> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.outcome)
    }
}

pub struct UpgradeManager<'a> {
    ctx: SchemaContext<'a>,
}

impl<'a> UpgradeManager<'a> {
    pub fn new(dialect: &'a Dialect, definition: &'a SchemaDefinition) -> Self {
        Self {
            ctx: SchemaContext {
                dialect,
                definition,
            },
        }
    }

    fn transition(&self, table: Table, state: SchemaState) {
        tracing::info!(
            backend = %self.ctx.dialect.kind(),
            table = %table,
            state = ?state,
            "Schema state changed"
        );
    }

    fn migration_error(&self, table: Table, from: u32, error: StorageError) -> StorageError {
        match error {
            StorageError::MigrationFailed { .. } => error,
            other => StorageError::migration_failed(
                self.ctx.dialect.kind(),
                table.name(),
                from,
                other.to_string(),
            ),
        }
    }

    /// Stored version of `table`; a table without a row predates the
    /// versions table and counts as version 1.
    pub fn stored_version(&self, conn: &mut Connection, table: Table) -> Result<u32, StorageError> {
        let row = conn.query_opt(
            StorageOperation::Migrate,
            self.ctx.dialect.statement(Query::VersionGet),
            &[table.name().into()],
        )?;
        match row {
            None => Ok(1),
            Some(row) => row
                .integer("version")
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| StorageError::malformed("version", format!("{:?}", row.get("version")))),
        }
    }

    fn record_version(
        &self,
        conn: &mut Connection,
        table: Table,
        version: u32,
    ) -> Result<(), StorageError> {
        conn.execute(
            StorageOperation::Migrate,
            self.ctx.dialect.statement(Query::VersionSet),
            &[table.name().into(), version.into()],
        )?;
        Ok(())
    }

    /// Create or upgrade every table, versions first.
    pub fn run(&self, conn: &mut Connection) -> Result<MigrationReport, StorageError> {
        let mut report = MigrationReport::default();
        for table in Table::ALL {
            let outcome = self.run_table(conn, table)?;
            report.tables.push(TableReport { table, outcome });
        }
        tracing::info!(
            backend = %self.ctx.dialect.kind(),
            changed = report.changed(),
            "Schema is current"
        );
        Ok(report)
    }

    fn run_table(&self, conn: &mut Connection, table: Table) -> Result<MigrationOutcome, StorageError> {
        let current = table.current_version();

        if !migrations::table_exists(conn, &self.ctx, table)
            .map_err(|e| self.migration_error(table, 0, e))?
        {
            self.transition(table, SchemaState::Uninitialized);
            conn.in_transaction(StorageOperation::Migrate, |conn| {
                conn.execute_batch(StorageOperation::Migrate, &self.ctx.create_sql(table))?;
                self.record_version(conn, table, current)
            })
            .map_err(|e| self.migration_error(table, 0, e))?;
            self.transition(table, SchemaState::Current);
            return Ok(MigrationOutcome::Created { version: current });
        }

        let stored = self
            .stored_version(conn, table)
            .map_err(|e| self.migration_error(table, 0, e))?;

        if stored == current {
            return Ok(MigrationOutcome::Unchanged { version: current });
        }
        if stored > current {
            return Err(StorageError::migration_failed(
                self.ctx.dialect.kind(),
                table.name(),
                stored,
                format!(
                    "stored version {} is newer than supported version {}; \
                     the database was written by a newer release",
                    stored, current
                ),
            ));
        }

        let mut version = stored;
        while version < current {
            let step = migrations::steps_for(table)
                .find(|s| s.from == version)
                .ok_or_else(|| {
                    StorageError::migration_failed(
                        self.ctx.dialect.kind(),
                        table.name(),
                        version,
                        "no upgrade step from this version",
                    )
                })?;
            version = self.apply(conn, step)?;
        }
        self.transition(table, SchemaState::Current);

        Ok(MigrationOutcome::Upgraded {
            from: stored,
            to: version,
        })
    }

    fn apply(&self, conn: &mut Connection, step: &MigrationStep) -> Result<u32, StorageError> {
        self.transition(
            step.table,
            SchemaState::Upgrading {
                table: step.table,
                from: step.from,
            },
        );
        tracing::info!(table = %step.table, from = step.from, description = step.description, "Applying schema upgrade");

        conn.in_transaction(StorageOperation::Migrate, |conn| {
            let to = (step.apply)(conn, &self.ctx)?;
            if to <= step.from {
                return Err(StorageError::migration_failed(
                    self.ctx.dialect.kind(),
                    step.table.name(),
                    step.from,
                    format!("step did not advance the version (returned {})", to),
                ));
            }
            self.record_version(conn, step.table, to)?;
            Ok(to)
        })
        .map_err(|e| {
            tracing::error!(table = %step.table, from = step.from, error = %e, "Schema upgrade failed");
            self.migration_error(step.table, step.from, e)
        })
    }

    /// Every recorded (table, version) pair.
    pub fn versions(&self, conn: &mut Connection) -> Result<Vec<(String, u32)>, StorageError> {
        conn.query(
            StorageOperation::SchemaVersions,
            self.ctx.dialect.statement(Query::VersionList),
            &[],
        )?
        .into_iter()
        .map(|row| {
            let name = row.text("name").unwrap_or_default().to_string();
            let version = row
                .integer("version")
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| StorageError::malformed("version", name.clone()))?;
            Ok((name, version))
        })
        .collect()
    }
}
