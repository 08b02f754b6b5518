//! Player and destroyed-block records.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error type for material name validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaterialNameError {
    #[error("Material name cannot be empty")]
    Empty,
    #[error("Material name too long ({length} chars, max {max})")]
    TooLong { length: usize, max: usize },
    #[error("Material name '{name}' contains invalid characters")]
    InvalidCharacters { name: String },
}

/// Validated material identifier such as `DIAMOND_ORE`.
///
/// Accepts ASCII alphanumerics plus `_`, `:`, `.` and `-` (namespaced ids
/// like `minecraft:stone` included) and normalizes to upper case, so
/// `stone` and `STONE` address the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MaterialName(String);

impl MaterialName {
    /// Matches the width of the `material_name` column.
    pub const MAX_LENGTH: usize = 64;

    pub fn new(name: &str) -> Result<Self, MaterialNameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MaterialNameError::Empty);
        }
        if name.len() > Self::MAX_LENGTH {
            return Err(MaterialNameError::TooLong {
                length: name.len(),
                max: Self::MAX_LENGTH,
            });
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-'))
        {
            return Err(MaterialNameError::InvalidCharacters {
                name: name.to_string(),
            });
        }
        Ok(Self(name.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaterialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MaterialName {
    type Error = MaterialNameError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(&name)
    }
}

impl From<MaterialName> for String {
    fn from(name: MaterialName) -> Self {
        name.0
    }
}

/// Latest known destroy count for one (player, material) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyedBlock {
    pub player: Uuid,
    pub material: MaterialName,
    pub destroyed: u32,
}

impl DestroyedBlock {
    pub fn new(player: Uuid, material: MaterialName, destroyed: u32) -> Self {
        Self {
            player,
            material,
            destroyed,
        }
    }
}

/// Persisted state of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: Uuid,
    /// Last known display name.
    pub name: String,
    pub alerts_enabled: bool,
    pub blocks: Vec<DestroyedBlock>,
}

impl PlayerRecord {
    /// A player with alerts enabled and no block data.
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            alerts_enabled: true,
            blocks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_alerts(mut self, enabled: bool) -> Self {
        self.alerts_enabled = enabled;
        self
    }

    /// Replace (or add) the count for one material.
    pub fn set_destroyed(&mut self, material: MaterialName, destroyed: u32) {
        match self.blocks.iter_mut().find(|b| b.material == material) {
            Some(block) => block.destroyed = destroyed,
            None => self
                .blocks
                .push(DestroyedBlock::new(self.id, material, destroyed)),
        }
    }

    pub fn destroyed(&self, material: &MaterialName) -> Option<u32> {
        self.blocks
            .iter()
            .find(|b| &b.material == material)
            .map(|b| b.destroyed)
    }

    /// Sum over every material, used for leaderboard ranking.
    pub fn total_destroyed(&self) -> u64 {
        self.blocks.iter().map(|b| u64::from(b.destroyed)).sum()
    }

    /// Whether storage should keep a row for this player at all.
    ///
    /// Players with alerts disabled and no block data are deleted instead
    /// of upserted.
    pub fn has_persistent_state(&self) -> bool {
        self.alerts_enabled || !self.blocks.is_empty()
    }
}
