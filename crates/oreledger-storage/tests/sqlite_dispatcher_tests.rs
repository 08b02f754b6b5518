//! Storage dispatcher tests against the embedded SQLite backend
//!
//! Covers the persistence guarantees gameplay code relies on: delete on
//! empty state, round trips, leaderboard ranking and paging, migration of
//! version 1 databases and tolerance of malformed rows.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use oreledger_core::database::TablePrefix;
use oreledger_core::{MaterialName, PlayerRecord, PlayerStorage, StorageError, Uuid};
use oreledger_storage::{MigrationOutcome, StorageDispatcher, StorageSettings, Table};
use tempfile::{TempDir, tempdir};

fn material(name: &str) -> MaterialName {
    MaterialName::new(name).expect("Valid material")
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("database.db")
}

fn open(path: &Path) -> StorageDispatcher {
    StorageDispatcher::init(&StorageSettings::sqlite(path)).expect("SQLite init should succeed")
}

fn raw(path: &Path) -> rusqlite::Connection {
    rusqlite::Connection::open(path).expect("Raw connection should open")
}

/// A player with alerts off and no blocks is deleted, and deleting twice is harmless
#[test]
fn test_delete_on_empty_is_idempotent() {
    let dir = tempdir().unwrap();
    let storage = open(&db_path(&dir));
    let id = Uuid::new_v4();

    storage.upsert_or_delete_player(&PlayerRecord::new(id, "Steve"));
    assert!(storage.get_player(id).is_some());

    let empty = PlayerRecord::new(id, "Steve").with_alerts(false);
    storage.upsert_or_delete_player(&empty);
    assert!(storage.get_player(id).is_none());

    storage.upsert_or_delete_player(&empty);
    assert!(storage.get_player(id).is_none());
    assert_eq!(storage.try_get_player(id).unwrap(), None);
}

/// Alerts off but with block data keeps the row
#[test]
fn test_player_with_blocks_is_kept_when_alerts_disabled() {
    let dir = tempdir().unwrap();
    let storage = open(&db_path(&dir));
    let id = Uuid::new_v4();

    let mut player = PlayerRecord::new(id, "Alex").with_alerts(false);
    player.set_destroyed(material("COAL_ORE"), 2);
    storage.upsert_or_delete_player(&player);
    storage.upsert_destroyed_block_count(id, &material("COAL_ORE"), 2);

    let loaded = storage.get_player(id).expect("Player should be kept");
    assert!(!loaded.alerts_enabled);
    assert_eq!(loaded.destroyed(&material("COAL_ORE")), Some(2));
}

/// Everything written comes back unchanged, with blocks attached
#[test]
fn test_round_trip_with_blocks() {
    let dir = tempdir().unwrap();
    let storage = open(&db_path(&dir));
    let id = Uuid::new_v4();

    storage.upsert_or_delete_player(&PlayerRecord::new(id, "Notch").with_alerts(true));
    storage.upsert_destroyed_block_count(id, &material("DIAMOND_ORE"), 12);
    storage.upsert_destroyed_block_count(id, &material("ANCIENT_DEBRIS"), 1);

    let player = storage.get_player(id).expect("Player should exist");
    assert_eq!(player.id, id);
    assert_eq!(player.name, "Notch");
    assert!(player.alerts_enabled);
    assert_eq!(player.blocks.len(), 2);
    assert_eq!(player.destroyed(&material("DIAMOND_ORE")), Some(12));
    assert_eq!(player.destroyed(&material("ANCIENT_DEBRIS")), Some(1));
    assert!(player.blocks.iter().all(|b| b.player == id));

    let by_name = storage.get_player_by_name("Notch").expect("Lookup by name");
    assert_eq!(by_name, player);
    assert!(storage.get_player_by_name("Jeb").is_none());
}

/// A second upsert replaces the stored count and the stored name
#[test]
fn test_upsert_replaces() {
    let dir = tempdir().unwrap();
    let storage = open(&db_path(&dir));
    let id = Uuid::new_v4();

    storage.upsert_or_delete_player(&PlayerRecord::new(id, "OldName"));
    storage.upsert_destroyed_block_count(id, &material("STONE"), 10);
    storage.upsert_destroyed_block_count(id, &material("STONE"), 4);

    let mut renamed = PlayerRecord::new(id, "NewName").with_alerts(false);
    renamed.set_destroyed(material("STONE"), 4);
    storage.upsert_or_delete_player(&renamed);

    let player = storage.get_player(id).unwrap();
    assert_eq!(player.name, "NewName");
    assert!(!player.alerts_enabled);
    assert_eq!(player.blocks.len(), 1);
    assert_eq!(player.destroyed(&material("STONE")), Some(4));
}

/// Leaderboard is ranked, bounded by `limit` and paged by `offset`
#[test]
fn test_leaderboard_order_bound_and_paging() {
    let dir = tempdir().unwrap();
    let storage = open(&db_path(&dir));

    let mut ids: Vec<Uuid> = (0..7).map(|_| Uuid::new_v4()).collect();
    for (i, id) in ids.iter().enumerate() {
        storage.upsert_or_delete_player(&PlayerRecord::new(*id, format!("p{}", i)));
        // Two materials per player so ranking uses the sum.
        storage.upsert_destroyed_block_count(*id, &material("STONE"), i as u32 * 5);
        storage.upsert_destroyed_block_count(*id, &material("DIRT"), i as u32 * 5);
    }
    ids.reverse();

    let all = storage.get_leaderboard(100, 0);
    assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), ids);
    assert!(
        all.windows(2)
            .all(|w| w[0].total_destroyed() >= w[1].total_destroyed())
    );

    let first = storage.get_leaderboard(3, 0);
    let second = storage.get_leaderboard(3, 3);
    let third = storage.get_leaderboard(3, 6);
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    assert_eq!(third.len(), 1);
    let paged: Vec<Uuid> = first.iter().chain(&second).chain(&third).map(|p| p.id).collect();
    assert_eq!(paged, ids);

    assert!(storage.get_leaderboard(0, 0).is_empty());
    assert!(storage.get_leaderboard(5, 50).is_empty());
}

/// Equal totals are ordered by identifier
#[test]
fn test_leaderboard_ties_break_by_identifier() {
    let dir = tempdir().unwrap();
    let storage = open(&db_path(&dir));

    let mut ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    for id in &ids {
        storage.upsert_or_delete_player(&PlayerRecord::new(*id, "tied"));
        storage.upsert_destroyed_block_count(*id, &material("GOLD_ORE"), 8);
    }
    ids.sort();

    let board: Vec<Uuid> = storage.get_leaderboard(10, 0).iter().map(|p| p.id).collect();
    assert_eq!(board, ids);
}

/// Counts up to u32::MAX are stored as given and totals may exceed it
#[test]
fn test_full_range_counts_round_trip() {
    let dir = tempdir().unwrap();
    let storage = open(&db_path(&dir));
    let hoarder = Uuid::new_v4();
    let casual = Uuid::new_v4();

    storage.upsert_or_delete_player(&PlayerRecord::new(hoarder, "Hoarder"));
    storage.upsert_or_delete_player(&PlayerRecord::new(casual, "Casual"));
    storage.upsert_destroyed_block_count(hoarder, &material("STONE"), u32::MAX);
    storage.upsert_destroyed_block_count(hoarder, &material("DIRT"), 3_000_000_000);
    storage.upsert_destroyed_block_count(casual, &material("STONE"), u32::MAX - 1);

    let player = storage.get_player(hoarder).expect("Player should exist");
    assert_eq!(player.destroyed(&material("STONE")), Some(u32::MAX));
    assert_eq!(player.destroyed(&material("DIRT")), Some(3_000_000_000));
    assert_eq!(player.total_destroyed(), u64::from(u32::MAX) + 3_000_000_000);

    let board: Vec<Uuid> = storage.get_leaderboard(10, 0).iter().map(|p| p.id).collect();
    assert_eq!(board, vec![hoarder, casual]);
}

/// Size counts distinct players with block rows, whatever their player row
#[test]
fn test_leaderboard_size_counts_eligible_players() {
    let dir = tempdir().unwrap();
    let storage = open(&db_path(&dir));
    assert_eq!(storage.get_leaderboard_size(), 0);

    let with_blocks = Uuid::new_v4();
    let without_blocks = Uuid::new_v4();
    let orphan = Uuid::new_v4();

    storage.upsert_or_delete_player(&PlayerRecord::new(with_blocks, "a"));
    storage.upsert_destroyed_block_count(with_blocks, &material("STONE"), 1);
    storage.upsert_destroyed_block_count(with_blocks, &material("DIRT"), 1);
    storage.upsert_or_delete_player(&PlayerRecord::new(without_blocks, "b"));
    storage.upsert_destroyed_block_count(orphan, &material("STONE"), 50);

    assert_eq!(storage.get_leaderboard_size(), 2);

    // The orphan ranks first but has no player row to return.
    let board = storage.get_leaderboard(10, 0);
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].id, with_blocks);
}

/// A row with an unparseable identifier is skipped, the rest still load
#[test]
fn test_malformed_identifier_is_skipped() {
    let dir = tempdir().unwrap();
    let path = db_path(&dir);
    let storage = open(&path);

    let good = Uuid::new_v4();
    storage.upsert_or_delete_player(&PlayerRecord::new(good, "good"));
    storage.upsert_destroyed_block_count(good, &material("STONE"), 5);

    raw(&path)
        .execute_batch(
            "INSERT INTO oreledger_players (uuid, name, alerts) VALUES ('not-a-uuid', 'bad', 1);
             INSERT INTO oreledger_blocks (player, material_name, destroyed) VALUES ('not-a-uuid', 'STONE', 99);",
        )
        .unwrap();

    let board = storage.get_leaderboard(10, 0);
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].id, good);
    assert_eq!(storage.get_leaderboard_size(), 2);

    assert!(storage.get_player_by_name("bad").is_none());
    assert!(matches!(
        storage.try_get_player_by_name("bad"),
        Err(StorageError::MalformedIdentifier { column: "uuid", .. })
    ));
}

/// Re-initializing a current database applies nothing
#[test]
fn test_second_init_performs_no_migration() {
    let dir = tempdir().unwrap();
    let path = db_path(&dir);
    let id = Uuid::new_v4();
    {
        let storage = open(&path);
        storage.upsert_or_delete_player(&PlayerRecord::new(id, "Persisted"));
    }

    let storage = open(&path);
    let report = storage.migrate().expect("Migrate should succeed");
    assert!(!report.changed());
    for table in Table::ALL {
        assert_eq!(
            report.outcome(table),
            Some(MigrationOutcome::Unchanged {
                version: table.current_version()
            })
        );
    }
    assert_eq!(storage.get_player(id).unwrap().name, "Persisted");
}

/// Version 1 tables are upgraded in place without losing data
#[test]
fn test_version_one_database_is_upgraded() {
    let dir = tempdir().unwrap();
    let path = db_path(&dir);
    let steve = Uuid::new_v4();
    let alex = Uuid::new_v4();

    raw(&path)
        .execute_batch(&format!(
            "CREATE TABLE oreledger_players (uuid VARCHAR(36) NOT NULL PRIMARY KEY, alerts INTEGER NOT NULL DEFAULT 1);
             CREATE TABLE oreledger_blocks (id INTEGER PRIMARY KEY AUTOINCREMENT, player VARCHAR(36), material_name VARCHAR(64), destroyed INTEGER);
             INSERT INTO oreledger_players (uuid, alerts) VALUES ('{steve}', 0), ('{alex}', 1);
             INSERT INTO oreledger_blocks (player, material_name, destroyed) VALUES
                 ('{steve}', 'STONE', 3), ('{steve}', 'STONE', 9), ('{steve}', 'DIRT', 1), ('{alex}', 'IRON_ORE', 4);"
        ))
        .unwrap();

    let storage = open(&path);
    let versions = storage.schema_versions().unwrap();
    assert!(versions.contains(&("players".to_string(), 2)));
    assert!(versions.contains(&("blocks".to_string(), 2)));

    let upgraded = storage.get_player(steve).expect("Steve survives the upgrade");
    assert_eq!(upgraded.name, "");
    assert!(!upgraded.alerts_enabled);
    assert_eq!(upgraded.destroyed(&material("STONE")), Some(9));
    assert_eq!(upgraded.destroyed(&material("DIRT")), Some(1));

    // The rebuilt table enforces the composite key, so upserts replace.
    storage.upsert_destroyed_block_count(alex, &material("IRON_ORE"), 5);
    assert_eq!(
        storage.get_player(alex).unwrap().destroyed(&material("IRON_ORE")),
        Some(5)
    );
    assert_eq!(storage.get_leaderboard_size(), 2);
}

/// A database written by a newer release refuses to start
#[test]
fn test_newer_schema_refuses_init() {
    let dir = tempdir().unwrap();
    let path = db_path(&dir);
    drop(open(&path));
    raw(&path)
        .execute("UPDATE oreledger_versions SET version = 3 WHERE name = 'blocks'", [])
        .unwrap();

    let err = StorageDispatcher::init(&StorageSettings::sqlite(&path)).unwrap_err();
    assert!(matches!(err, StorageError::MigrationFailed { from: 3, .. }));
}

/// Table prefixes keep two installations apart in one file
#[test]
fn test_table_prefix_isolates_data() {
    let dir = tempdir().unwrap();
    let path = db_path(&dir);

    let default = open(&path);
    let mut settings = StorageSettings::sqlite(&path);
    settings.table_prefix = TablePrefix::new("other_").unwrap();
    drop(default);

    let other = StorageDispatcher::init(&settings).unwrap();
    let id = Uuid::new_v4();
    other.upsert_or_delete_player(&PlayerRecord::new(id, "Isolated"));
    drop(other);

    let default = open(&path);
    assert!(default.get_player(id).is_none());
    let tables: i64 = raw(&path)
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'other\\_%' ESCAPE '\\'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 3);
}

/// The dispatcher can be shared across threads
#[test]
fn test_concurrent_access() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(open(&db_path(&dir)));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let storage = Arc::clone(&storage);
            std::thread::spawn(move || {
                let id = Uuid::new_v4();
                storage.upsert_or_delete_player(&PlayerRecord::new(id, format!("worker{}", i)));
                for j in 0..10u32 {
                    storage.upsert_destroyed_block_count(id, &material("STONE"), j);
                }
                let player = storage.get_player(id).expect("Player should exist");
                assert_eq!(player.destroyed(&material("STONE")), Some(9));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(storage.get_leaderboard_size(), 8);
    assert_eq!(storage.health().unwrap().active, 0);
}
