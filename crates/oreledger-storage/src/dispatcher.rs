//! Storage dispatcher
//!
//! Owns the connection provider, the resolved dialect and the schema, and
//! turns player operations into statements. Every call checks out exactly
//! one connection and returns it before the call ends.
//!
//! Two surfaces are offered over the same code:
//!
//! - [`PlayerStorage`] never fails; errors are logged and degrade to
//!   `None`, an empty page, zero or a no-op.
//! - The `try_*` methods return [`StorageError`] so callers that need to
//!   tell "not found" from "backend down" can.

use oreledger_core::database::TablePrefix;
use oreledger_core::error::{BackendKind, StorageError, StorageOperation};
use oreledger_core::player::{DestroyedBlock, MaterialName, PlayerRecord};
use oreledger_core::storage::PlayerStorage;
use uuid::Uuid;

use crate::dialect::{Dialect, Query};
use crate::pool::PoolHealth;
use crate::provider::{Connection, ConnectionProvider};
use crate::schema::{MigrationReport, SchemaDefinition, UpgradeManager};
use crate::settings::{BackendConfig, StorageSettings};
use crate::value::SqlRow;

/// Relational [`PlayerStorage`] over SQLite or PostgreSQL.
///
/// Only constructed once the backend is reachable and every table is at
/// its current version, so no player operation can run against a
/// half-upgraded database.
pub struct StorageDispatcher {
    provider: ConnectionProvider,
    dialect: Dialect,
    definition: SchemaDefinition,
}

impl std::fmt::Debug for StorageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageDispatcher")
            .field("backend", &self.provider.kind())
            .field("table_prefix", &self.dialect.prefix().as_str())
            .finish()
    }
}

impl StorageDispatcher {
    /// Select the backend named by `settings`, open it and bring the schema
    /// up to date.
    pub fn init(settings: &StorageSettings) -> Result<Self, StorageError> {
        Self::init_with_report(settings).map(|(dispatcher, _)| dispatcher)
    }

    /// Like [`init`](Self::init), also returning what the upgrade did.
    pub fn init_with_report(
        settings: &StorageSettings,
    ) -> Result<(Self, MigrationReport), StorageError> {
        let config = settings.backend_config()?;
        Self::open(&config, settings.table_prefix.clone())
    }

    fn open(
        config: &BackendConfig,
        prefix: TablePrefix,
    ) -> Result<(Self, MigrationReport), StorageError> {
        let kind = config.kind();
        let definition = SchemaDefinition::for_backend(kind)?;
        let dialect = Dialect::new(kind, prefix);
        let provider = ConnectionProvider::open(config)?;

        let dispatcher = Self {
            provider,
            dialect,
            definition,
        };
        let report = dispatcher.migrate().inspect_err(|e| {
            tracing::error!(backend = %kind, error = %e, "Storage initialization failed");
        })?;
        tracing::info!(
            backend = %kind,
            table_prefix = dispatcher.dialect.prefix().as_str(),
            schema_changed = report.changed(),
            "Storage ready"
        );
        Ok((dispatcher, report))
    }

    /// Run the upgrade manager again. A no-op on a current database.
    pub fn migrate(&self) -> Result<MigrationReport, StorageError> {
        let mut conn = self.provider.acquire()?;
        UpgradeManager::new(&self.dialect, &self.definition).run(&mut conn)
    }

    /// Recorded version of every table.
    pub fn schema_versions(&self) -> Result<Vec<(String, u32)>, StorageError> {
        let mut conn = self.provider.acquire()?;
        UpgradeManager::new(&self.dialect, &self.definition).versions(&mut conn)
    }

    pub fn health(&self) -> Result<PoolHealth, StorageError> {
        self.provider.health()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.provider.kind()
    }

    fn sql(&self, query: Query) -> &str {
        self.dialect.statement(query)
    }

    fn parse_uuid(column: &'static str, row: &SqlRow) -> Result<Uuid, StorageError> {
        let raw = row.text(column).unwrap_or_default();
        Uuid::parse_str(raw.trim()).map_err(|_| StorageError::malformed(column, raw))
    }

    fn player_from_row(
        &self,
        conn: &mut Connection,
        row: &SqlRow,
    ) -> Result<PlayerRecord, StorageError> {
        let id = Self::parse_uuid("uuid", row)?;
        let alerts_enabled = row.boolean("alerts").ok_or_else(|| {
            StorageError::malformed("alerts", format!("{:?}", row.get("alerts")))
        })?;
        let blocks = self.load_blocks(conn, id)?;

        Ok(PlayerRecord {
            id,
            name: row.text("name").unwrap_or_default().to_string(),
            alerts_enabled,
            blocks,
        })
    }

    fn load_blocks(
        &self,
        conn: &mut Connection,
        id: Uuid,
    ) -> Result<Vec<DestroyedBlock>, StorageError> {
        let rows = conn.query(
            StorageOperation::LoadBlocks,
            self.sql(Query::BlocksGetForPlayer),
            &[id.to_string().into()],
        )?;

        let mut blocks = Vec::with_capacity(rows.len());
        for row in rows {
            let raw = row.text("material_name").unwrap_or_default();
            let material = match MaterialName::new(raw) {
                Ok(material) => material,
                Err(e) => {
                    tracing::warn!(player = %id, material = raw, error = %e, "Skipping block row with malformed material");
                    continue;
                }
            };
            let Some(destroyed) = row.integer("destroyed").and_then(|n| u32::try_from(n).ok())
            else {
                tracing::warn!(player = %id, material = %material, "Skipping block row with invalid count");
                continue;
            };
            blocks.push(DestroyedBlock::new(id, material, destroyed));
        }
        Ok(blocks)
    }

    fn load_player(
        &self,
        conn: &mut Connection,
        id: Uuid,
    ) -> Result<Option<PlayerRecord>, StorageError> {
        let row = conn.query_opt(
            StorageOperation::LoadPlayer,
            self.sql(Query::PlayerGet),
            &[id.to_string().into()],
        )?;
        row.map(|row| self.player_from_row(conn, &row)).transpose()
    }

    /// Upsert `player`, or delete its row when alerts are off and it has no
    /// block data.
    pub fn try_upsert_or_delete_player(&self, player: &PlayerRecord) -> Result<(), StorageError> {
        let mut conn = self.provider.acquire()?;
        if player.has_persistent_state() {
            conn.execute(
                StorageOperation::UpsertPlayer,
                self.sql(Query::PlayerUpsert),
                &[
                    player.id.to_string().into(),
                    player.name.as_str().into(),
                    player.alerts_enabled.into(),
                ],
            )?;
            tracing::debug!(player = %player.id, "Player saved");
        } else {
            let deleted = conn.execute(
                StorageOperation::DeletePlayer,
                self.sql(Query::PlayerDelete),
                &[player.id.to_string().into()],
            )?;
            tracing::debug!(player = %player.id, deleted, "Player has no persistent state");
        }
        Ok(())
    }

    pub fn try_get_player(&self, id: Uuid) -> Result<Option<PlayerRecord>, StorageError> {
        let mut conn = self.provider.acquire()?;
        self.load_player(&mut conn, id)
    }

    /// First row the backend returns for `name`.
    pub fn try_get_player_by_name(&self, name: &str) -> Result<Option<PlayerRecord>, StorageError> {
        let mut conn = self.provider.acquire()?;
        let row = conn.query_opt(
            StorageOperation::LoadPlayer,
            self.sql(Query::PlayerGetByName),
            &[name.into()],
        )?;
        row.map(|row| self.player_from_row(&mut conn, &row)).transpose()
    }

    /// Players ranked by total destroyed blocks, descending, ties broken by
    /// identifier. Rows whose identifier does not parse, and block totals
    /// whose player row is gone, are skipped.
    pub fn try_get_leaderboard(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PlayerRecord>, StorageError> {
        let mut conn = self.provider.acquire()?;
        let rows = conn.query(
            StorageOperation::Leaderboard,
            self.sql(Query::LeaderboardPage),
            &[limit.into(), offset.into()],
        )?;

        let mut players = Vec::with_capacity(rows.len());
        for row in rows {
            let id = match Self::parse_uuid("player", &row) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping leaderboard entry");
                    continue;
                }
            };
            match self.load_player(&mut conn, id) {
                Ok(Some(player)) => players.push(player),
                Ok(None) => {
                    tracing::debug!(player = %id, "Skipping leaderboard entry without player row");
                }
                Err(e) if e.is_row_local() => {
                    tracing::warn!(player = %id, error = %e, "Skipping leaderboard entry");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(players)
    }

    /// Distinct players with at least one block row.
    pub fn try_get_leaderboard_size(&self) -> Result<u32, StorageError> {
        let mut conn = self.provider.acquire()?;
        let total = conn
            .query_opt(
                StorageOperation::LeaderboardSize,
                self.sql(Query::LeaderboardSize),
                &[],
            )?
            .and_then(|row| row.integer("total"))
            .unwrap_or(0);
        Ok(u32::try_from(total.max(0)).unwrap_or(u32::MAX))
    }

    pub fn try_upsert_destroyed_block_count(
        &self,
        player: Uuid,
        material: &MaterialName,
        count: u32,
    ) -> Result<(), StorageError> {
        let mut conn = self.provider.acquire()?;
        conn.execute(
            StorageOperation::UpsertBlock,
            self.sql(Query::BlockUpsert),
            &[
                player.to_string().into(),
                material.as_str().into(),
                count.into(),
            ],
        )?;
        Ok(())
    }
}

/// Log a failed operation and drop the error.
fn logged<T>(operation: StorageOperation, result: Result<T, StorageError>) -> Option<T> {
    result
        .map_err(|e| {
            tracing::error!(operation = %operation, error = %e, "Storage operation failed");
        })
        .ok()
}

impl PlayerStorage for StorageDispatcher {
    fn upsert_or_delete_player(&self, player: &PlayerRecord) {
        logged(
            StorageOperation::UpsertPlayer,
            self.try_upsert_or_delete_player(player),
        );
    }

    fn get_player(&self, id: Uuid) -> Option<PlayerRecord> {
        logged(StorageOperation::LoadPlayer, self.try_get_player(id)).flatten()
    }

    fn get_player_by_name(&self, name: &str) -> Option<PlayerRecord> {
        logged(StorageOperation::LoadPlayer, self.try_get_player_by_name(name)).flatten()
    }

    fn get_leaderboard(&self, limit: u32, offset: u32) -> Vec<PlayerRecord> {
        logged(
            StorageOperation::Leaderboard,
            self.try_get_leaderboard(limit, offset),
        )
        .unwrap_or_default()
    }

    fn get_leaderboard_size(&self) -> u32 {
        logged(
            StorageOperation::LeaderboardSize,
            self.try_get_leaderboard_size(),
        )
        .unwrap_or(0)
    }

    fn upsert_destroyed_block_count(&self, player: Uuid, material: &MaterialName, count: u32) {
        logged(
            StorageOperation::UpsertBlock,
            self.try_upsert_destroyed_block_count(player, material, count),
        );
    }
}
