//! # OreLedger Core
//!
//! Records, validated identifiers, the storage error taxonomy and the
//! [`PlayerStorage`] contract shared by every OreLedger backend.

pub mod database;
pub mod error;
pub mod in_memory;
pub mod player;
pub mod sanitization;
pub mod storage;

pub use error::{BackendKind, StorageError, StorageErrorKind, StorageOperation};
pub use in_memory::InMemoryStorage;
pub use player::{DestroyedBlock, MaterialName, MaterialNameError, PlayerRecord};
pub use storage::PlayerStorage;

// Re-exported so callers do not need a direct uuid dependency.
pub use uuid::Uuid;
