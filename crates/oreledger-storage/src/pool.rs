//! Bounded blocking connection pool with RAII checkout
//!
//! Both backends share this pool; a [`ConnectionManager`] supplies the
//! backend-specific parts (opening a connection and deciding when an idle
//! one has to be thrown away). Callers block on a condition variable while
//! the pool is exhausted, up to the configured acquire timeout.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use oreledger_core::error::{BackendKind, StorageError, StorageErrorKind};

/// Backend-specific half of a [`Pool`].
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send;

    fn backend(&self) -> BackendKind;

    /// Open a fresh connection.
    fn connect(&self) -> Result<Self::Connection, StorageError>;

    /// Whether an idle connection must be discarded instead of reused.
    fn is_expired(&self, _connection: &Self::Connection) -> bool {
        false
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolHealth {
    /// Idle connections ready to be handed out.
    pub available: usize,
    /// Configured upper bound.
    pub total: usize,
    /// Connections currently checked out.
    pub active: usize,
}

struct PoolState<C> {
    idle: Vec<C>,
    /// Live connections, idle plus checked out.
    open: usize,
}

/// Thread-safe pool of at most `max_size` connections.
pub struct Pool<M: ConnectionManager> {
    manager: M,
    state: Mutex<PoolState<M::Connection>>,
    returned: Condvar,
    max_size: usize,
    acquire_timeout: Duration,
}

impl<M: ConnectionManager> Pool<M> {
    pub fn new(manager: M, max_size: usize, acquire_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            manager,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(max_size),
                open: 0,
            }),
            returned: Condvar::new(),
            max_size: max_size.max(1),
            acquire_timeout,
        })
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState<M::Connection>>, StorageError> {
        self.state.lock().map_err(|e| {
            StorageError::connection_failed(
                self.manager.backend(),
                StorageErrorKind::InternalError {
                    backend_error: format!("Failed to lock connection pool: {}", e),
                },
            )
        })
    }

    /// Check out a connection, opening a new one while under the size limit
    /// and waiting for a returned one otherwise.
    pub fn acquire(self: &Arc<Self>) -> Result<Pooled<M>, StorageError> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut state = self.lock()?;

        loop {
            while let Some(conn) = state.idle.pop() {
                if self.manager.is_expired(&conn) {
                    state.open -= 1;
                    tracing::debug!(backend = %self.manager.backend(), "Discarding expired idle connection");
                    continue;
                }
                return Ok(Pooled::new(conn, Arc::clone(self)));
            }

            if state.open < self.max_size {
                state.open += 1;
                drop(state);
                return match self.manager.connect() {
                    Ok(conn) => Ok(Pooled::new(conn, Arc::clone(self))),
                    Err(e) => {
                        self.forget_one();
                        Err(e)
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StorageError::connection_failed(
                    self.manager.backend(),
                    StorageErrorKind::ResourceExhausted {
                        resource: "connection_pool".to_string(),
                        limit: format!(
                            "{} active connections (max: {}) after waiting {:?}",
                            state.open, self.max_size, self.acquire_timeout
                        ),
                    },
                ));
            }

            state = self
                .returned
                .wait_timeout(state, deadline - now)
                .map_err(|e| {
                    StorageError::connection_failed(
                        self.manager.backend(),
                        StorageErrorKind::InternalError {
                            backend_error: format!("Failed to wait for connection: {}", e),
                        },
                    )
                })?
                .0;
        }
    }

    /// Current occupancy.
    pub fn health(&self) -> Result<PoolHealth, StorageError> {
        let state = self.lock()?;
        Ok(PoolHealth {
            available: state.idle.len(),
            total: self.max_size,
            active: state.open - state.idle.len(),
        })
    }

    fn release(&self, conn: M::Connection) {
        match self.state.lock() {
            Ok(mut state) => {
                if self.manager.is_expired(&conn) {
                    state.open -= 1;
                    tracing::debug!(backend = %self.manager.backend(), "Closing expired connection on release");
                } else {
                    state.idle.push(conn);
                }
                self.returned.notify_one();
            }
            Err(e) => {
                tracing::error!(
                    backend = %self.manager.backend(),
                    error = %e,
                    "Failed to lock pool for connection return - connection dropped"
                );
            }
        }
    }

    /// A slot reserved for a new connection was not used.
    fn forget_one(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.open -= 1;
            self.returned.notify_one();
        }
    }
}

/// RAII checkout that returns the connection to its pool on drop.
pub struct Pooled<M: ConnectionManager> {
    connection: Option<M::Connection>,
    pool: Arc<Pool<M>>,
}

impl<M: ConnectionManager> Pooled<M> {
    fn new(connection: M::Connection, pool: Arc<Pool<M>>) -> Self {
        Self {
            connection: Some(connection),
            pool,
        }
    }

    pub fn manager(&self) -> &M {
        self.pool.manager()
    }
}

impl<M: ConnectionManager> Deref for Pooled<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("BUG: Pooled has None connection (this should never happen)")
    }
}

impl<M: ConnectionManager> DerefMut for Pooled<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("BUG: Pooled has None connection (this should never happen)")
    }
}

impl<M: ConnectionManager> Drop for Pooled<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            self.pool.release(conn);
        }
    }
}
