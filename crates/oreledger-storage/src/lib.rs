//! # OreLedger Storage
//!
//! Relational persistence for OreLedger player data. One code path serves
//! both an embedded SQLite file and a PostgreSQL server:
//!
//! - **Connection provider**: bounded blocking pools with RAII checkout
//! - **Dialect resolver**: statement templates per backend, formatted once
//! - **Upgrade manager**: creates missing tables and applies versioned steps
//! - **Storage dispatcher**: implements [`PlayerStorage`] on top of the above
//!
//! ```rust
//! use oreledger_core::{MaterialName, PlayerRecord, PlayerStorage, Uuid};
//! use oreledger_storage::{StorageDispatcher, StorageSettings};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let storage = StorageDispatcher::init(&StorageSettings::sqlite(dir.path().join("ore.db"))).unwrap();
//!
//! let id = Uuid::new_v4();
//! storage.upsert_or_delete_player(&PlayerRecord::new(id, "Notch"));
//! storage.upsert_destroyed_block_count(id, &MaterialName::new("DIAMOND_ORE").unwrap(), 12);
//!
//! assert_eq!(storage.get_leaderboard(10, 0)[0].id, id);
//! ```
//!
//! [`PlayerStorage`]: oreledger_core::PlayerStorage

pub mod dialect;
pub mod dispatcher;
pub mod pool;
pub mod postgres;
pub mod provider;
pub mod schema;
pub mod settings;
pub mod sqlite;
pub mod value;

pub use dialect::{Dialect, Query};
pub use dispatcher::StorageDispatcher;
pub use pool::PoolHealth;
pub use provider::{Connection, ConnectionProvider};
pub use schema::{MigrationOutcome, MigrationReport, SchemaDefinition, Table, UpgradeManager};
pub use settings::{BackendConfig, StorageSettings};
pub use value::{SqlRow, SqlValue};
