//! Backend, operation and cause classifications shared by every storage error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Relational engine variant a storage component talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded, file-backed engine.
    Sqlite,
    /// Networked server engine.
    Postgres,
}

impl BackendKind {
    /// All recognized backend kinds.
    pub const ALL: [BackendKind; 2] = [BackendKind::Sqlite, BackendKind::Postgres];

    /// Lowercase name used in settings files and resource paths.
    pub const fn as_str(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Postgres => "postgres",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            _ => Err(UnknownBackendError {
                name: s.to_string(),
            }),
        }
    }
}

/// Returned when a backend selector names an engine we do not ship.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported storage backend '{name}' (expected one of: sqlite, postgres)")]
pub struct UnknownBackendError {
    pub name: String,
}

/// Logical storage operation, used to give statement failures context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Migrate,
    UpsertPlayer,
    DeletePlayer,
    LoadPlayer,
    LoadBlocks,
    UpsertBlock,
    Leaderboard,
    LeaderboardSize,
    SchemaVersions,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageOperation::Migrate => "migrate",
            StorageOperation::UpsertPlayer => "upsert player",
            StorageOperation::DeletePlayer => "delete player",
            StorageOperation::LoadPlayer => "load player",
            StorageOperation::LoadBlocks => "load blocks",
            StorageOperation::UpsertBlock => "upsert block",
            StorageOperation::Leaderboard => "leaderboard",
            StorageOperation::LeaderboardSize => "leaderboard size",
            StorageOperation::SchemaVersions => "schema versions",
        };
        f.write_str(name)
    }
}

/// Strongly-typed failure causes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Network connectivity issues
    NetworkError { details: String },

    /// Disk I/O issues
    IoError { details: String },

    /// Pool or other bounded resource exhausted
    ResourceExhausted { resource: String, limit: String },

    /// Authentication or authorization rejected by the server
    AccessDenied { reason: String },

    /// A value read from or written to the database had an unexpected shape
    InvalidValue { details: String },

    /// Anything the backend reported that fits no other category
    InternalError { backend_error: String },
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErrorKind::NetworkError { details } => write!(f, "network error: {}", details),
            StorageErrorKind::IoError { details } => write!(f, "I/O error: {}", details),
            StorageErrorKind::ResourceExhausted { resource, limit } => {
                write!(f, "{} exhausted ({})", resource, limit)
            }
            StorageErrorKind::AccessDenied { reason } => write!(f, "access denied: {}", reason),
            StorageErrorKind::InvalidValue { details } => write!(f, "invalid value: {}", details),
            StorageErrorKind::InternalError { backend_error } => {
                write!(f, "internal error: {}", backend_error)
            }
        }
    }
}
