//! Storage errors.
//!
//! Every failure the persistence layer can hit is one of the variants
//! below. The dispatcher catches all of them at its public boundary; they
//! only escape through initialization and the strict `try_*` API.

use super::types::{BackendKind, StorageErrorKind, StorageOperation};

/// Errors that can occur while talking to a relational backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Backend unreachable, misconfigured, or its pool is exhausted.
    #[error("Connection to {backend} backend failed: {kind}")]
    ConnectionFailed {
        backend: BackendKind,
        kind: StorageErrorKind,
    },

    /// A schema upgrade step failed; the previous version stays recorded.
    #[error("Migration of table '{table}' from version {from} failed on {backend} backend: {reason}")]
    MigrationFailed {
        backend: BackendKind,
        table: String,
        from: u32,
        reason: String,
    },

    /// A stored value could not be parsed back into a domain identifier.
    #[error("Malformed value '{raw}' in column '{column}'")]
    MalformedIdentifier { column: &'static str, raw: String },

    /// Any other failure while preparing or executing a statement.
    #[error("{operation} statement failed on {backend} backend: {kind}")]
    StatementFailed {
        backend: BackendKind,
        operation: StorageOperation,
        kind: StorageErrorKind,
    },

    /// Settings rejected before any connection was attempted.
    #[error("Invalid storage configuration: {reason}")]
    Config { reason: String },
}

impl StorageError {
    /// Create a connection failed error.
    pub fn connection_failed(backend: BackendKind, kind: StorageErrorKind) -> Self {
        StorageError::ConnectionFailed { backend, kind }
    }

    /// Create a statement failed error carrying an internal backend message.
    pub fn statement_failed(
        backend: BackendKind,
        operation: StorageOperation,
        backend_error: impl Into<String>,
    ) -> Self {
        StorageError::StatementFailed {
            backend,
            operation,
            kind: StorageErrorKind::InternalError {
                backend_error: backend_error.into(),
            },
        }
    }

    /// Create a migration failed error.
    pub fn migration_failed(
        backend: BackendKind,
        table: impl Into<String>,
        from: u32,
        reason: impl Into<String>,
    ) -> Self {
        StorageError::MigrationFailed {
            backend,
            table: table.into(),
            from,
            reason: reason.into(),
        }
    }

    /// Create a malformed identifier error.
    pub fn malformed(column: &'static str, raw: impl Into<String>) -> Self {
        StorageError::MalformedIdentifier {
            column,
            raw: raw.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        StorageError::Config {
            reason: reason.into(),
        }
    }

    /// Backend the error came from, when one was involved.
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            StorageError::ConnectionFailed { backend, .. }
            | StorageError::MigrationFailed { backend, .. }
            | StorageError::StatementFailed { backend, .. } => Some(*backend),
            StorageError::MalformedIdentifier { .. } | StorageError::Config { .. } => None,
        }
    }

    /// Whether the failure affects a single row rather than the operation.
    pub fn is_row_local(&self) -> bool {
        matches!(self, StorageError::MalformedIdentifier { .. })
    }

    /// Whether the backend itself was unavailable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::ConnectionFailed { .. })
    }
}
