//! Storage settings as read from the plugin configuration
//!
//! ```rust
//! use oreledger_storage::settings::{BackendConfig, StorageSettings};
//!
//! let settings = StorageSettings::from_toml_str(r#"
//!     type = "sqlite"
//!
//!     [sqlite]
//!     path = "plugins/OreLedger/database.db"
//! "#).unwrap();
//!
//! assert!(matches!(settings.backend_config().unwrap(), BackendConfig::Sqlite(_)));
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use oreledger_core::database::{DatabaseName, HostAddress, PoolSize, TablePrefix};
use oreledger_core::error::{BackendKind, StorageError};
use serde::{Deserialize, Serialize};

use crate::postgres::PostgresConfig;
use crate::sqlite::SqliteConfig;

/// Top-level storage section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Backend selector, `sqlite` or `postgres`.
    #[serde(rename = "type")]
    pub backend: String,
    pub table_prefix: TablePrefix,
    pub sqlite: SqliteSettings,
    pub postgres: PostgresSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    pub address: HostAddress,
    pub port: u16,
    pub database: DatabaseName,
    pub username: String,
    pub password: String,
    pub pool_size: PoolSize,
    pub connection_lifetime_ms: u64,
    pub charset: String,
    pub use_ssl: bool,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

/// Resolved backend selection carrying only that backend's settings.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Sqlite(SqliteConfig),
    Postgres(PostgresConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Sqlite(_) => BackendKind::Sqlite,
            BackendConfig::Postgres(_) => BackendKind::Postgres,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite.as_str().to_string(),
            table_prefix: TablePrefix::default(),
            sqlite: SqliteSettings::default(),
            postgres: PostgresSettings::default(),
        }
    }
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("plugins/OreLedger/database.db"),
            busy_timeout_ms: 5000,
            acquire_timeout_ms: 10_000,
        }
    }
}

impl Default for PostgresSettings {
    fn default() -> Self {
        let defaults = PostgresConfig::default();
        Self {
            address: defaults.host,
            port: defaults.port,
            database: defaults.database,
            username: defaults.user,
            password: String::new(),
            pool_size: defaults.pool_size,
            connection_lifetime_ms: defaults.max_lifetime.as_millis() as u64,
            charset: defaults.charset,
            use_ssl: defaults.use_tls,
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            acquire_timeout_ms: defaults.acquire_timeout.as_millis() as u64,
        }
    }
}

impl StorageSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, StorageError> {
        toml::from_str(text)
            .map_err(|e| StorageError::config(format!("Failed to parse storage settings: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StorageError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Settings for an SQLite database at `path` with defaults elsewhere.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            sqlite: SqliteSettings {
                path: path.into(),
                ..SqliteSettings::default()
            },
            ..Self::default()
        }
    }

    /// Parsed backend selector. Unknown names are a configuration error.
    pub fn backend_kind(&self) -> Result<BackendKind, StorageError> {
        self.backend
            .parse::<BackendKind>()
            .map_err(|e| StorageError::config(e.to_string()))
    }

    /// Resolve the selector into the matching backend configuration.
    pub fn backend_config(&self) -> Result<BackendConfig, StorageError> {
        Ok(match self.backend_kind()? {
            BackendKind::Sqlite => BackendConfig::Sqlite(SqliteConfig {
                busy_timeout: Duration::from_millis(self.sqlite.busy_timeout_ms),
                acquire_timeout: Duration::from_millis(self.sqlite.acquire_timeout_ms),
                ..SqliteConfig::new(&self.sqlite.path)
            }),
            BackendKind::Postgres => {
                let pg = &self.postgres;
                let config = PostgresConfig {
                    host: pg.address.clone(),
                    port: pg.port,
                    database: pg.database.clone(),
                    user: pg.username.clone(),
                    password: Some(pg.password.clone()).filter(|p| !p.is_empty()),
                    pool_size: pg.pool_size,
                    max_lifetime: Duration::from_millis(pg.connection_lifetime_ms),
                    charset: pg.charset.clone(),
                    use_tls: pg.use_ssl,
                    connect_timeout: Duration::from_millis(pg.connect_timeout_ms),
                    acquire_timeout: Duration::from_millis(pg.acquire_timeout_ms),
                    ..PostgresConfig::default()
                };
                config.validate()?;
                BackendConfig::Postgres(config)
            }
        })
    }
}
