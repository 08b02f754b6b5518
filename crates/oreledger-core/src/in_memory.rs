use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::player::{DestroyedBlock, MaterialName, PlayerRecord};
use crate::storage::PlayerStorage;

#[derive(Debug, Clone)]
struct PlayerRow {
    name: String,
    alerts_enabled: bool,
}

#[derive(Default)]
struct Tables {
    players: HashMap<Uuid, PlayerRow>,
    blocks: BTreeMap<(Uuid, MaterialName), u32>,
}

/// Transient [`PlayerStorage`] backed by in-process maps.
///
/// Mirrors the relational layout: player rows and block rows live in
/// separate tables, deleting a player leaves its block rows alone, and
/// leaderboard entries whose player row is missing are skipped. Useful for
/// tests of gameplay code and as a reference model for the SQL backends.
///
/// ```rust
/// use oreledger_core::{InMemoryStorage, MaterialName, PlayerRecord, PlayerStorage};
/// use uuid::Uuid;
///
/// let storage = InMemoryStorage::new();
/// let id = Uuid::new_v4();
/// storage.upsert_or_delete_player(&PlayerRecord::new(id, "Notch"));
/// storage.upsert_destroyed_block_count(id, &MaterialName::new("STONE").unwrap(), 5);
///
/// assert_eq!(storage.get_player(id).unwrap().total_destroyed(), 5);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Option<std::sync::RwLockReadGuard<'_, Tables>> {
        match self.tables.read() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::error!(error = %e, "In-memory storage lock poisoned");
                None
            }
        }
    }

    fn write(&self) -> Option<std::sync::RwLockWriteGuard<'_, Tables>> {
        match self.tables.write() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::error!(error = %e, "In-memory storage lock poisoned");
                None
            }
        }
    }

    fn assemble(tables: &Tables, id: Uuid) -> Option<PlayerRecord> {
        let row = tables.players.get(&id)?;
        let blocks = tables
            .blocks
            .iter()
            .filter(|((player, _), _)| *player == id)
            .map(|((player, material), destroyed)| {
                DestroyedBlock::new(*player, material.clone(), *destroyed)
            })
            .collect();
        Some(PlayerRecord {
            id,
            name: row.name.clone(),
            alerts_enabled: row.alerts_enabled,
            blocks,
        })
    }

    fn totals(tables: &Tables) -> Vec<(Uuid, u64)> {
        let mut totals: BTreeMap<Uuid, u64> = BTreeMap::new();
        for ((player, _), destroyed) in &tables.blocks {
            *totals.entry(*player).or_default() += u64::from(*destroyed);
        }
        let mut ranked: Vec<(Uuid, u64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }
}

impl PlayerStorage for InMemoryStorage {
    fn upsert_or_delete_player(&self, player: &PlayerRecord) {
        let Some(mut tables) = self.write() else {
            return;
        };
        if player.has_persistent_state() {
            tables.players.insert(
                player.id,
                PlayerRow {
                    name: player.name.clone(),
                    alerts_enabled: player.alerts_enabled,
                },
            );
        } else {
            tables.players.remove(&player.id);
        }
    }

    fn get_player(&self, id: Uuid) -> Option<PlayerRecord> {
        let tables = self.read()?;
        Self::assemble(&tables, id)
    }

    fn get_player_by_name(&self, name: &str) -> Option<PlayerRecord> {
        let tables = self.read()?;
        let id = tables
            .players
            .iter()
            .filter(|(_, row)| row.name == name)
            .map(|(id, _)| *id)
            .min()?;
        Self::assemble(&tables, id)
    }

    fn get_leaderboard(&self, limit: u32, offset: u32) -> Vec<PlayerRecord> {
        let Some(tables) = self.read() else {
            return Vec::new();
        };
        Self::totals(&tables)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|(id, _)| Self::assemble(&tables, id))
            .collect()
    }

    fn get_leaderboard_size(&self) -> u32 {
        self.read()
            .map(|tables| u32::try_from(Self::totals(&tables).len()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }

    fn upsert_destroyed_block_count(&self, player: Uuid, material: &MaterialName, count: u32) {
        if let Some(mut tables) = self.write() {
            tables.blocks.insert((player, material.clone()), count);
        }
    }
}
