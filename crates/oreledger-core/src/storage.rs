//! The contract gameplay code persists players through.

use uuid::Uuid;

use crate::player::{MaterialName, PlayerRecord};

/// Best-effort player persistence.
///
/// Implementations never surface errors: failures are logged and the call
/// degrades to a no-op, `None`, an empty page or zero. Gameplay must never
/// block on, or crash because of, persistence.
///
/// All methods take `&self`; implementations are expected to be shared
/// across threads.
pub trait PlayerStorage: Send + Sync {
    /// Persist `player`, or delete its row when alerts are disabled and it
    /// has no block data.
    fn upsert_or_delete_player(&self, player: &PlayerRecord);

    /// Player by identifier with all of its block counts attached.
    fn get_player(&self, id: Uuid) -> Option<PlayerRecord>;

    /// Player by last known display name. When several rows share a name
    /// the backend decides which one is returned.
    fn get_player_by_name(&self, name: &str) -> Option<PlayerRecord>;

    /// Players ranked by total destroyed blocks, highest first.
    fn get_leaderboard(&self, limit: u32, offset: u32) -> Vec<PlayerRecord>;

    /// Number of players eligible for the leaderboard.
    fn get_leaderboard_size(&self) -> u32;

    /// Replace the stored count for one (player, material) pair.
    fn upsert_destroyed_block_count(&self, player: Uuid, material: &MaterialName, count: u32);
}
