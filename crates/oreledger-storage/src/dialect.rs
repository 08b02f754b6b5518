//! Dialect resolver
//!
//! Every statement the dispatcher and the upgrade manager run is written
//! once as a backend-agnostic skeleton using `?` placeholders and
//! `{table_*}` names. Where the engines disagree (upserts, catalog lookups)
//! a backend-specific skeleton overrides the generic one. [`Dialect`]
//! resolves and formats the whole table once, at initialization.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use oreledger_core::database::TablePrefix;
use oreledger_core::error::BackendKind;

/// Logical statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    PlayerUpsert,
    PlayerDelete,
    PlayerGet,
    PlayerGetByName,
    BlocksGetForPlayer,
    BlockUpsert,
    LeaderboardPage,
    LeaderboardSize,
    VersionGet,
    VersionSet,
    VersionList,
    TableExists,
    ColumnExists,
}

impl Query {
    pub const ALL: [Query; 13] = [
        Query::PlayerUpsert,
        Query::PlayerDelete,
        Query::PlayerGet,
        Query::PlayerGetByName,
        Query::BlocksGetForPlayer,
        Query::BlockUpsert,
        Query::LeaderboardPage,
        Query::LeaderboardSize,
        Query::VersionGet,
        Query::VersionSet,
        Query::VersionList,
        Query::TableExists,
        Query::ColumnExists,
    ];
}

/// `None` marks a skeleton shared by every backend.
type TemplateKey = (Query, Option<BackendKind>);

static TEMPLATES: Lazy<HashMap<TemplateKey, &'static str>> = Lazy::new(|| {
    use BackendKind::{Postgres, Sqlite};

    HashMap::from([
        (
            (Query::PlayerUpsert, Some(Sqlite)),
            "INSERT OR REPLACE INTO {table_players} (uuid, name, alerts) VALUES (?, ?, ?)",
        ),
        (
            (Query::PlayerUpsert, Some(Postgres)),
            "INSERT INTO {table_players} (uuid, name, alerts) VALUES (?, ?, ?) \
             ON CONFLICT (uuid) DO UPDATE SET name = EXCLUDED.name, alerts = EXCLUDED.alerts",
        ),
        (
            (Query::PlayerDelete, None),
            "DELETE FROM {table_players} WHERE uuid = ?",
        ),
        (
            (Query::PlayerGet, None),
            "SELECT uuid, name, alerts FROM {table_players} WHERE uuid = ?",
        ),
        (
            (Query::PlayerGetByName, None),
            "SELECT uuid, name, alerts FROM {table_players} WHERE name = ? LIMIT 1",
        ),
        (
            (Query::BlocksGetForPlayer, None),
            "SELECT player, material_name, destroyed FROM {table_blocks} \
             WHERE player = ? ORDER BY material_name",
        ),
        (
            (Query::BlockUpsert, Some(Sqlite)),
            "INSERT OR REPLACE INTO {table_blocks} (player, material_name, destroyed) VALUES (?, ?, ?)",
        ),
        (
            (Query::BlockUpsert, Some(Postgres)),
            "INSERT INTO {table_blocks} (player, material_name, destroyed) VALUES (?, ?, ?) \
             ON CONFLICT (player, material_name) DO UPDATE SET destroyed = EXCLUDED.destroyed",
        ),
        (
            (Query::LeaderboardPage, Some(Sqlite)),
            "SELECT player, SUM(destroyed) AS total FROM {table_blocks} \
             GROUP BY player ORDER BY total DESC, player ASC LIMIT ? OFFSET ?",
        ),
        (
            // SUM(bigint) is NUMERIC on PostgreSQL.
            (Query::LeaderboardPage, Some(Postgres)),
            "SELECT player, CAST(SUM(destroyed) AS BIGINT) AS total FROM {table_blocks} \
             GROUP BY player ORDER BY total DESC, player ASC LIMIT ? OFFSET ?",
        ),
        (
            (Query::LeaderboardSize, None),
            "SELECT COUNT(DISTINCT player) AS total FROM {table_blocks}",
        ),
        (
            (Query::VersionGet, None),
            "SELECT version FROM {table_versions} WHERE name = ?",
        ),
        (
            (Query::VersionSet, Some(Sqlite)),
            "INSERT OR REPLACE INTO {table_versions} (name, version) VALUES (?, ?)",
        ),
        (
            (Query::VersionSet, Some(Postgres)),
            "INSERT INTO {table_versions} (name, version) VALUES (?, ?) \
             ON CONFLICT (name) DO UPDATE SET version = EXCLUDED.version",
        ),
        (
            (Query::VersionList, None),
            "SELECT name, version FROM {table_versions} ORDER BY name",
        ),
        (
            (Query::TableExists, Some(Sqlite)),
            "SELECT COUNT(*) AS total FROM sqlite_master WHERE type = 'table' AND name = ?",
        ),
        (
            (Query::TableExists, Some(Postgres)),
            "SELECT COUNT(*) AS total FROM pg_catalog.pg_tables \
             WHERE schemaname = current_schema() AND tablename = ?",
        ),
        (
            (Query::ColumnExists, Some(Sqlite)),
            "SELECT COUNT(*) AS total FROM pragma_table_info(?) WHERE name = ?",
        ),
        (
            (Query::ColumnExists, Some(Postgres)),
            "SELECT COUNT(*) AS total FROM pg_catalog.pg_attribute \
             WHERE attrelid = to_regclass(?) AND attname = ? AND attnum > 0 AND NOT attisdropped",
        ),
    ])
});

/// Skeleton for `query` on `kind`, preferring a backend-specific one.
pub fn template(query: Query, kind: BackendKind) -> Option<&'static str> {
    TEMPLATES
        .get(&(query, Some(kind)))
        .or_else(|| TEMPLATES.get(&(query, None)))
        .copied()
}

/// Statement text for one backend and table prefix, formatted once.
#[derive(Debug, Clone)]
pub struct Dialect {
    kind: BackendKind,
    prefix: TablePrefix,
    statements: HashMap<Query, String>,
}

impl Dialect {
    pub fn new(kind: BackendKind, prefix: TablePrefix) -> Self {
        let mut dialect = Self {
            kind,
            prefix,
            statements: HashMap::with_capacity(Query::ALL.len()),
        };
        dialect.statements = Query::ALL
            .into_iter()
            .filter_map(|query| {
                template(query, kind).map(|skeleton| (query, dialect.format_generic(skeleton)))
            })
            .collect();
        dialect
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn prefix(&self) -> &TablePrefix {
        &self.prefix
    }

    /// Formatted statement for `query`.
    pub fn statement(&self, query: Query) -> &str {
        self.statements
            .get(&query)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Substitute table names and, for PostgreSQL, number placeholders.
    pub fn format_generic(&self, skeleton: &str) -> String {
        let named = skeleton
            .replace("{table_versions}", &self.prefix.table("versions"))
            .replace("{table_players}", &self.prefix.table("players"))
            .replace("{table_blocks}", &self.prefix.table("blocks"));

        match self.kind {
            BackendKind::Sqlite => named,
            BackendKind::Postgres => number_placeholders(&named),
        }
    }
}

/// Rewrite `?` to `$1..$n`, leaving string literals untouched.
fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut in_literal = false;
    let mut next = 1;

    for c in sql.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '?' if !in_literal => {
                out.push('$');
                out.push_str(&next.to_string());
                next += 1;
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn dialect(kind: BackendKind) -> Dialect {
        Dialect::new(kind, TablePrefix::default())
    }

    #[rstest]
    #[case(BackendKind::Sqlite)]
    #[case(BackendKind::Postgres)]
    fn every_query_resolves(#[case] kind: BackendKind) {
        let dialect = dialect(kind);
        for query in Query::ALL {
            assert!(template(query, kind).is_some(), "{query:?} has no template");
            let sql = dialect.statement(query);
            assert!(!sql.is_empty());
            assert_eq!(
                sql,
                dialect.format_generic(template(query, kind).unwrap()),
                "{query:?} resolved to another statement"
            );
            assert!(!sql.contains("{table_"), "{query:?} left a placeholder: {sql}");
        }
    }

    #[rstest]
    #[case(BackendKind::Sqlite, "INSERT OR REPLACE INTO oreledger_blocks")]
    #[case(BackendKind::Postgres, "ON CONFLICT (player, material_name) DO UPDATE")]
    fn block_upsert_uses_backend_syntax(#[case] kind: BackendKind, #[case] expected: &str) {
        assert!(dialect(kind).statement(Query::BlockUpsert).contains(expected));
    }

    #[rstest]
    #[case(BackendKind::Sqlite, "WHERE uuid = ?")]
    #[case(BackendKind::Postgres, "WHERE uuid = $1")]
    fn placeholders_follow_backend(#[case] kind: BackendKind, #[case] expected: &str) {
        assert!(dialect(kind).statement(Query::PlayerGet).ends_with(expected));
    }

    #[test]
    fn postgres_numbers_placeholders_in_order() {
        let sql = dialect(BackendKind::Postgres).statement(Query::LeaderboardPage).to_string();
        assert!(sql.ends_with("LIMIT $1 OFFSET $2"));
        assert!(sql.contains("CAST(SUM(destroyed) AS BIGINT)"));
    }

    #[test]
    fn literals_are_left_alone() {
        assert_eq!(
            number_placeholders("SELECT '?' AS q, x FROM t WHERE a = ? AND b = '??' AND c = ?"),
            "SELECT '?' AS q, x FROM t WHERE a = $1 AND b = '??' AND c = $2"
        );
    }

    #[test]
    fn prefix_is_applied() {
        let dialect = Dialect::new(BackendKind::Sqlite, TablePrefix::new("ol_").unwrap());
        assert_eq!(
            dialect.statement(Query::PlayerDelete),
            "DELETE FROM ol_players WHERE uuid = ?"
        );
        assert_eq!(
            dialect.format_generic("DROP TABLE {table_versions}"),
            "DROP TABLE ol_versions"
        );
    }

    #[test]
    fn backend_templates_override_generic() {
        let sqlite = template(Query::TableExists, BackendKind::Sqlite).unwrap();
        let postgres = template(Query::TableExists, BackendKind::Postgres).unwrap();
        assert!(sqlite.contains("sqlite_master"));
        assert!(postgres.contains("pg_tables"));
    }
}
