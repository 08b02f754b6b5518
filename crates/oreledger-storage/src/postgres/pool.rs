//! PostgreSQL connection pool
//!
//! tokio-postgres is asynchronous; the pool owns a small Tokio runtime that
//! drives every connection task and blocks on it for each statement, so the
//! rest of the crate stays synchronous.

use std::sync::Arc;
use std::time::{Duration, Instant};

use oreledger_core::error::{BackendKind, StorageError, StorageErrorKind};
use oreledger_core::sanitization::DatabaseErrorSanitizer;
use tokio::runtime::Runtime;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Config, NoTls, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;

use super::config::PostgresConfig;
use crate::pool::{ConnectionManager, Pool, Pooled};

/// A client plus the moment it was opened, for max-lifetime checks.
pub struct PgConnection {
    pub(crate) client: Client,
    created_at: Instant,
}

impl PgConnection {
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Opens PostgreSQL connections for a [`Pool`].
pub struct PostgresManager {
    pg_config: Config,
    tls: Option<MakeRustlsConnect>,
    runtime: Arc<Runtime>,
    max_lifetime: Duration,
}

pub type PostgresPool = Pool<PostgresManager>;
pub type PooledConnection = Pooled<PostgresManager>;

impl PostgresManager {
    pub fn new(config: &PostgresConfig) -> Result<Self, StorageError> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("oreledger-postgres")
            .enable_all()
            .build()
            .map_err(|e| {
                StorageError::connection_failed(
                    BackendKind::Postgres,
                    StorageErrorKind::InternalError {
                        backend_error: format!("Failed to start PostgreSQL runtime: {}", e),
                    },
                )
            })?;

        let tls = if config.use_tls {
            Some(Self::tls_connector()?)
        } else {
            None
        };

        Ok(Self {
            pg_config: config.build_pg_config(),
            tls,
            runtime: Arc::new(runtime),
            max_lifetime: config.max_lifetime,
        })
    }

    fn tls_connector() -> Result<MakeRustlsConnect, StorageError> {
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| StorageError::config(format!("Invalid TLS configuration: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(MakeRustlsConnect::new(config))
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Map a driver error onto the crate taxonomy with credentials removed.
    pub(crate) fn classify_error(error: &tokio_postgres::Error) -> StorageErrorKind {
        match error.as_db_error() {
            Some(db) => DatabaseErrorSanitizer::classify(&format!("{}: {}", db.code().code(), db.message())),
            None => DatabaseErrorSanitizer::classify(error),
        }
    }

    async fn connect_with<T>(config: &Config, tls: T) -> Result<Client, tokio_postgres::Error>
    where
        T: MakeTlsConnect<Socket>,
        T::Stream: Send + 'static,
    {
        let (client, connection) = config.connect(tls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(
                    error = %DatabaseErrorSanitizer::sanitize(&e),
                    "PostgreSQL connection error"
                );
            }
        });
        Ok(client)
    }
}

impl ConnectionManager for PostgresManager {
    type Connection = PgConnection;

    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn connect(&self) -> Result<PgConnection, StorageError> {
        let result = match &self.tls {
            Some(tls) => self
                .runtime
                .block_on(Self::connect_with(&self.pg_config, tls.clone())),
            None => self
                .runtime
                .block_on(Self::connect_with(&self.pg_config, NoTls)),
        };

        let client = result.map_err(|e| {
            StorageError::connection_failed(BackendKind::Postgres, Self::classify_error(&e))
        })?;

        tracing::debug!(tls = self.tls.is_some(), "Opened PostgreSQL connection");
        Ok(PgConnection {
            client,
            created_at: Instant::now(),
        })
    }

    fn is_expired(&self, connection: &PgConnection) -> bool {
        connection.client.is_closed() || connection.age() >= self.max_lifetime
    }
}

/// Open the bounded pool for `config`. Connections are opened lazily.
pub fn open(config: &PostgresConfig) -> Result<Arc<PostgresPool>, StorageError> {
    let manager = PostgresManager::new(config)?;
    Ok(Pool::new(
        manager,
        config.pool_size.get(),
        config.acquire_timeout,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_charset_fails_before_connecting() {
        let config = PostgresConfig {
            charset: "latin1".to_string(),
            ..PostgresConfig::default()
        };
        assert!(matches!(open(&config), Err(StorageError::Config { .. })));
    }

    #[test]
    fn tls_connector_builds() {
        assert!(PostgresManager::tls_connector().is_ok());
    }

    #[test]
    fn pool_uses_configured_size() {
        let config = PostgresConfig {
            pool_size: oreledger_core::database::PoolSize::new(4).unwrap(),
            ..PostgresConfig::default()
        };
        let pool = open(&config).unwrap();
        let health = pool.health().unwrap();
        assert_eq!(health.total, 4);
        assert_eq!(health.active, 0);
    }
}
