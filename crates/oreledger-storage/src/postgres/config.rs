//! PostgreSQL connection configuration
//!
//! This module provides configuration structures and validation for PostgreSQL connections.

use std::time::Duration;

use oreledger_core::database::{DatabaseName, HostAddress, PoolSize};
use oreledger_core::error::StorageError;
use tokio_postgres::Config;

/// Character set names the driver can honour. It always speaks UTF-8.
const UTF8_ALIASES: &[&str] = &["utf8", "utf-8", "utf8mb4"];

/// PostgreSQL connection configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database host
    pub host: HostAddress,
    /// Database port
    pub port: u16,
    /// Database name
    pub database: DatabaseName,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: Option<String>,
    /// Connection pool size (validated 1-100)
    pub pool_size: PoolSize,
    /// Connections older than this are closed instead of reused
    pub max_lifetime: Duration,
    /// Requested client character set
    pub charset: String,
    /// Connect over TLS using the webpki root store
    pub use_tls: bool,
    pub connect_timeout: Duration,
    /// How long `acquire` waits on an exhausted pool
    pub acquire_timeout: Duration,
    /// Application name for connection identification
    pub application_name: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: HostAddress::localhost(),
            port: 5432,
            database: DatabaseName::default(),
            user: "oreledger".to_string(),
            password: None,
            pool_size: PoolSize::default_size(),
            max_lifetime: Duration::from_millis(1_800_000),
            charset: "utf8".to_string(),
            use_tls: false,
            connect_timeout: Duration::from_millis(5000),
            acquire_timeout: Duration::from_millis(10_000),
            application_name: "oreledger".to_string(),
        }
    }
}

impl PostgresConfig {
    /// Validate configuration before any connection is attempted
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.user.trim().is_empty() {
            return Err(StorageError::config("PostgreSQL username cannot be empty"));
        }

        if self.port == 0 {
            return Err(StorageError::config("PostgreSQL port cannot be 0"));
        }

        if !UTF8_ALIASES
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(self.charset.trim()))
        {
            return Err(StorageError::config(format!(
                "Unsupported character set '{}' (the PostgreSQL driver only speaks UTF-8)",
                self.charset
            )));
        }

        if self.max_lifetime.is_zero() {
            return Err(StorageError::config(
                "PostgreSQL connection lifetime must be positive",
            ));
        }

        Ok(())
    }

    /// Build tokio_postgres Config
    pub fn build_pg_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(self.host.as_str())
            .port(self.port)
            .dbname(self.database.as_str())
            .user(&self.user)
            .application_name(&self.application_name)
            .connect_timeout(self.connect_timeout);

        if let Some(ref password) = self.password {
            config.password(password);
        }

        config
    }
}
