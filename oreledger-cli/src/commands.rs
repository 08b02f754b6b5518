//! Subcommand implementations. Each one opens storage through the same
//! path the server uses and writes pretty JSON to `out`.

use std::io::Write;

use oreledger_core::{BackendKind, PlayerRecord, StorageError, Uuid};
use oreledger_storage::{MigrationReport, PoolHealth, StorageDispatcher, StorageSettings};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("No player matches '{0}'")]
    NotFound(String),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

fn emit<T: Serialize>(out: &mut impl Write, value: &T) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct MigrateOutput<'a> {
    backend: BackendKind,
    changed: bool,
    #[serde(flatten)]
    report: &'a MigrationReport,
}

pub fn run_migrate(settings: &StorageSettings, out: &mut impl Write) -> Result<(), CliError> {
    let (storage, report) = StorageDispatcher::init_with_report(settings)?;
    emit(
        out,
        &MigrateOutput {
            backend: storage.backend_kind(),
            changed: report.changed(),
            report: &report,
        },
    )
}

#[derive(Debug, Serialize)]
struct TableVersion {
    table: String,
    version: u32,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    backend: BackendKind,
    table_prefix: String,
    schema: Vec<TableVersion>,
    pool: PoolHealth,
    leaderboard_size: u32,
}

pub fn run_status(settings: &StorageSettings, out: &mut impl Write) -> Result<(), CliError> {
    let storage = StorageDispatcher::init(settings)?;
    let schema = storage
        .schema_versions()?
        .into_iter()
        .map(|(table, version)| TableVersion { table, version })
        .collect();

    emit(
        out,
        &StatusOutput {
            backend: storage.backend_kind(),
            table_prefix: settings.table_prefix.as_str().to_string(),
            schema,
            pool: storage.health()?,
            leaderboard_size: storage.try_get_leaderboard_size()?,
        },
    )
}

/// `query` is tried as a UUID first, then as a name.
pub fn run_player(
    settings: &StorageSettings,
    query: &str,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let storage = StorageDispatcher::init(settings)?;
    let player = match Uuid::parse_str(query) {
        Ok(id) => storage.try_get_player(id)?,
        Err(_) => storage.try_get_player_by_name(query)?,
    };
    let player = player.ok_or_else(|| CliError::NotFound(query.to_string()))?;
    emit(out, &player)
}

#[derive(Debug, Serialize)]
struct RankedPlayer {
    rank: u64,
    uuid: Uuid,
    name: String,
    total_destroyed: u64,
}

impl RankedPlayer {
    fn new(rank: u64, player: &PlayerRecord) -> Self {
        Self {
            rank,
            uuid: player.id,
            name: player.name.clone(),
            total_destroyed: player.total_destroyed(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TopOutput {
    total: u32,
    offset: u32,
    entries: Vec<RankedPlayer>,
}

pub fn run_top(
    settings: &StorageSettings,
    limit: u32,
    offset: u32,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let storage = StorageDispatcher::init(settings)?;
    let page = storage.try_get_leaderboard(limit, offset)?;
    let entries = page
        .iter()
        .zip(u64::from(offset) + 1..)
        .map(|(player, rank)| RankedPlayer::new(rank, player))
        .collect();

    emit(
        out,
        &TopOutput {
            total: storage.try_get_leaderboard_size()?,
            offset,
            entries,
        },
    )
}
