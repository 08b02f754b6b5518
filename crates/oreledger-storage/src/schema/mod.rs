//! Table definitions and schema evolution
//!
//! The DDL for each backend lives in `schemas/<backend>.sql` and is
//! compiled into the crate. [`UpgradeManager`] creates missing tables from
//! it and walks existing ones through [`MIGRATIONS`] until every table is
//! at its current version.

pub mod migrations;
pub mod upgrade;

pub use migrations::{MIGRATIONS, MigrationStep};
pub use upgrade::{MigrationOutcome, MigrationReport, SchemaState, TableReport, UpgradeManager};

use std::collections::HashMap;
use std::fmt;

use oreledger_core::error::{BackendKind, StorageError};
use serde::Serialize;

use crate::dialect::Dialect;

/// Tables we own, in the order they are created and upgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Versions,
    Players,
    Blocks,
}

impl Table {
    /// Init order; `versions` must come first.
    pub const ALL: [Table; 3] = [Table::Versions, Table::Players, Table::Blocks];

    /// Unprefixed name, also the key in the versions table.
    pub const fn name(self) -> &'static str {
        match self {
            Table::Versions => "versions",
            Table::Players => "players",
            Table::Blocks => "blocks",
        }
    }

    /// Version the bundled DDL creates.
    pub const fn current_version(self) -> u32 {
        match self {
            Table::Versions => 1,
            Table::Players => 2,
            Table::Blocks => 2,
        }
    }

    pub const fn placeholder(self) -> &'static str {
        match self {
            Table::Versions => "{table_versions}",
            Table::Players => "{table_players}",
            Table::Blocks => "{table_blocks}",
        }
    }

    fn from_placeholder(text: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.placeholder() == text)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const SQLITE_SCHEMA: &str = include_str!("../../schemas/sqlite.sql");
const POSTGRES_SCHEMA: &str = include_str!("../../schemas/postgres.sql");

/// Bundled DDL resource for `kind`, looked up by `schemas/<backend>.sql`.
pub fn bundled_schema(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Sqlite => SQLITE_SCHEMA,
        BackendKind::Postgres => POSTGRES_SCHEMA,
    }
}

/// One `CREATE TABLE` skeleton per table, parsed from a DDL file.
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    backend: BackendKind,
    statements: HashMap<Table, String>,
}

impl SchemaDefinition {
    pub fn for_backend(kind: BackendKind) -> Result<Self, StorageError> {
        Self::parse(kind, bundled_schema(kind))
    }

    /// Drop `--` comments, split on `;` and index each
    /// `CREATE TABLE {table_x}` by table.
    pub fn parse(backend: BackendKind, ddl: &str) -> Result<Self, StorageError> {
        let mut statements = HashMap::new();

        let uncommented = ddl
            .lines()
            .map(|line| line.split_once("--").map_or(line, |(code, _)| code))
            .collect::<Vec<_>>()
            .join("\n");

        for raw in uncommented.split(';') {
            let statement = raw.trim().to_string();
            if statement.is_empty() {
                continue;
            }

            let mut words = statement.split_whitespace();
            let head: Vec<&str> = words.by_ref().take(2).collect();
            if !head.iter().map(|w| w.to_ascii_uppercase()).eq(["CREATE", "TABLE"]) {
                return Err(StorageError::config(format!(
                    "Unexpected statement in {} schema: {}",
                    backend,
                    statement.lines().next().unwrap_or_default()
                )));
            }
            let table = words
                .next()
                .and_then(Table::from_placeholder)
                .ok_or_else(|| {
                    StorageError::config(format!(
                        "{} schema creates a table we do not own",
                        backend
                    ))
                })?;
            statements.insert(table, statement);
        }

        if let Some(missing) = Table::ALL.iter().find(|t| !statements.contains_key(*t)) {
            return Err(StorageError::config(format!(
                "{} schema has no definition for table '{}'",
                backend, missing
            )));
        }

        Ok(Self {
            backend,
            statements,
        })
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Unformatted `CREATE TABLE` skeleton.
    pub fn create_statement(&self, table: Table) -> &str {
        self.statements
            .get(&table)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// What a migration step gets to work with.
pub struct SchemaContext<'a> {
    pub dialect: &'a Dialect,
    pub definition: &'a SchemaDefinition,
}

impl SchemaContext<'_> {
    /// Prefixed name of `table`.
    pub fn table_name(&self, table: Table) -> String {
        self.dialect.prefix().table(table.name())
    }

    /// Formatted `CREATE TABLE` for `table` at its current version.
    pub fn create_sql(&self, table: Table) -> String {
        self.dialect
            .format_generic(self.definition.create_statement(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_schemas_define_every_table() {
        for kind in BackendKind::ALL {
            let definition = SchemaDefinition::for_backend(kind).unwrap();
            for table in Table::ALL {
                let sql = definition.create_statement(table);
                assert!(sql.starts_with("CREATE TABLE"), "{kind}/{table}: {sql}");
                assert!(sql.contains(table.placeholder()));
            }
        }
    }

    #[test]
    fn postgres_schema_uses_native_booleans() {
        let definition = SchemaDefinition::for_backend(BackendKind::Postgres).unwrap();
        assert!(definition.create_statement(Table::Players).contains("BOOLEAN"));
        assert!(
            definition
                .create_statement(Table::Blocks)
                .contains("destroyed BIGINT")
        );
    }

    #[test]
    fn comments_may_contain_semicolons() {
        let ddl = "-- versions first; then the rest\n\
                   CREATE TABLE {table_versions} (name TEXT, version INTEGER); -- trailing; note\n\
                   CREATE TABLE {table_players} (uuid TEXT -- key; text\n);\n\
                   CREATE TABLE {table_blocks} (player TEXT);";
        let definition = SchemaDefinition::parse(BackendKind::Sqlite, ddl).unwrap();
        assert_eq!(
            definition.create_statement(Table::Versions),
            "CREATE TABLE {table_versions} (name TEXT, version INTEGER)"
        );
        assert!(!definition.create_statement(Table::Players).contains("key"));
        assert!(definition.create_statement(Table::Blocks).starts_with("CREATE TABLE"));
    }

    #[test]
    fn rejects_foreign_statements() {
        assert!(SchemaDefinition::parse(BackendKind::Sqlite, "DROP TABLE {table_players};").is_err());
        assert!(
            SchemaDefinition::parse(BackendKind::Sqlite, "CREATE TABLE other (id INTEGER);")
                .is_err()
        );
    }

    #[test]
    fn rejects_incomplete_schema() {
        let ddl = "CREATE TABLE {table_versions} (name TEXT, version INTEGER);";
        assert!(matches!(
            SchemaDefinition::parse(BackendKind::Sqlite, ddl),
            Err(StorageError::Config { .. })
        ));
    }

    #[test]
    fn init_order_starts_with_versions() {
        assert_eq!(Table::ALL[0], Table::Versions);
    }
}
