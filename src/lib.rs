//! # OreLedger
//!
//! Umbrella crate re-exporting the record types, the storage contract and
//! the relational dispatcher.

pub use oreledger_core as core;
pub use oreledger_storage as storage;

pub use oreledger_core::{
    BackendKind, DestroyedBlock, InMemoryStorage, MaterialName, PlayerRecord, PlayerStorage,
    StorageError, Uuid,
};
pub use oreledger_storage::{StorageDispatcher, StorageSettings};
