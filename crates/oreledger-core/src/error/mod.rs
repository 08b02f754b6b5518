//! Error Types
//!
//! The error types are organized into focused submodules:
//! - `types`: backend kinds, operations and cause classifications
//! - `storage`: the storage error taxonomy itself

mod storage;
mod types;

pub use storage::StorageError;
pub use types::{BackendKind, StorageErrorKind, StorageOperation, UnknownBackendError};
