//! Validated database configuration types
//!
//! These newtypes enforce their invariants at construction time so that
//! settings deserialized from a file are either valid or rejected before a
//! connection is ever attempted.
//!
//! ```rust
//! use oreledger_core::database::{PoolSize, TablePrefix};
//!
//! let pool = PoolSize::new(20).expect("20 is valid");
//! assert_eq!(pool.get(), 20);
//! assert!(PoolSize::new(0).is_none());
//!
//! let prefix = TablePrefix::new("oreledger_").unwrap();
//! assert_eq!(prefix.table("players"), "oreledger_players");
//! ```

use serde::{Deserialize, Serialize};

/// Connection pool size constrained to 1-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct PoolSize(u8);

impl PoolSize {
    /// Minimum allowed pool size
    pub const MIN: u8 = 1;
    /// Maximum allowed pool size
    pub const MAX: u8 = 100;

    /// Create a pool size, `None` outside 1-100.
    pub const fn new(size: u8) -> Option<Self> {
        if size < Self::MIN || size > Self::MAX {
            None
        } else {
            Some(Self(size))
        }
    }

    /// Create a pool size from usize
    pub fn from_usize(size: usize) -> Option<Self> {
        u8::try_from(size).ok().and_then(Self::new)
    }

    /// Get the pool size as a usize
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Default pool size for the networked backend (10 connections)
    pub const fn default_size() -> Self {
        Self(10)
    }
}

impl Default for PoolSize {
    fn default() -> Self {
        Self::default_size()
    }
}

impl TryFrom<usize> for PoolSize {
    type Error = PoolSizeError;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::from_usize(size).ok_or(PoolSizeError::OutOfRange { size })
    }
}

impl From<PoolSize> for usize {
    fn from(pool: PoolSize) -> Self {
        pool.get()
    }
}

impl std::fmt::Display for PoolSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur when creating a PoolSize
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolSizeError {
    #[error("Pool size {size} is out of range (must be {}-{})", PoolSize::MIN, PoolSize::MAX)]
    OutOfRange { size: usize },
}

/// Database name with validation
///
/// Non-empty, at most 63 characters, alphanumeric plus `_` and `-`, and
/// not starting with a hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseName(String);

impl DatabaseName {
    /// Maximum length for database names (PostgreSQL identifier limit)
    pub const MAX_LENGTH: usize = 63;

    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();

        if name.is_empty() || name.len() > Self::MAX_LENGTH || name.starts_with('-') {
            return None;
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return None;
        }

        Some(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DatabaseName {
    fn default() -> Self {
        Self("oreledger".to_string())
    }
}

impl TryFrom<String> for DatabaseName {
    type Error = DatabaseNameError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name.clone()).ok_or(DatabaseNameError::Invalid { name })
    }
}

impl From<DatabaseName> for String {
    fn from(name: DatabaseName) -> Self {
        name.0
    }
}

impl std::fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseNameError {
    #[error("Invalid database name: {name}")]
    Invalid { name: String },
}

/// Host address (hostname, IPv4 or IPv6 literal)
///
/// Rejects empty values, values longer than the DNS limit and anything
/// that looks like a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostAddress(String);

impl HostAddress {
    /// Maximum length for host addresses
    pub const MAX_LENGTH: usize = 253;

    pub fn new(host: impl Into<String>) -> Option<Self> {
        let host = host.into();

        if host.is_empty() || host.len() > Self::MAX_LENGTH {
            return None;
        }

        if host.contains("..") || host.contains('/') || host.chars().any(char::is_whitespace) {
            return None;
        }

        Some(Self(host))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn localhost() -> Self {
        Self("localhost".to_string())
    }
}

impl TryFrom<String> for HostAddress {
    type Error = HostAddressError;

    fn try_from(host: String) -> Result<Self, Self::Error> {
        Self::new(host.clone()).ok_or(HostAddressError::Invalid { host })
    }
}

impl From<HostAddress> for String {
    fn from(host: HostAddress) -> Self {
        host.0
    }
}

impl std::fmt::Display for HostAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostAddressError {
    #[error("Invalid host address: {host}")]
    Invalid { host: String },
}

/// Prefix prepended to every table name.
///
/// Table names are spliced into statement text, so the prefix is limited
/// to lowercase ASCII letters, digits and underscores (at most 32).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TablePrefix(String);

impl TablePrefix {
    pub const MAX_LENGTH: usize = 32;

    pub fn new(prefix: impl Into<String>) -> Option<Self> {
        let prefix = prefix.into();

        if prefix.len() > Self::MAX_LENGTH {
            return None;
        }

        if !prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return None;
        }

        Some(Self(prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full table name for a logical table.
    pub fn table(&self, name: &str) -> String {
        format!("{}{}", self.0, name)
    }
}

impl Default for TablePrefix {
    fn default() -> Self {
        Self("oreledger_".to_string())
    }
}

impl TryFrom<String> for TablePrefix {
    type Error = TablePrefixError;

    fn try_from(prefix: String) -> Result<Self, Self::Error> {
        Self::new(prefix.clone()).ok_or(TablePrefixError::Invalid { prefix })
    }
}

impl From<TablePrefix> for String {
    fn from(prefix: TablePrefix) -> Self {
        prefix.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TablePrefixError {
    #[error("Invalid table prefix '{prefix}' (only a-z, 0-9 and _ allowed, max 32 characters)")]
    Invalid { prefix: String },
}
