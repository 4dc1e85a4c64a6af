//! Error types for Tickstore

use crate::{SeriesId, Timestamp};
use thiserror::Error;

/// Result type alias for Tickstore operations
pub type Result<T> = std::result::Result<T, TickError>;

/// Tickstore error types
#[derive(Error, Debug)]
pub enum TickError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid path or options passed to `Environment::open`
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The store cannot be opened or locked for the requested mode
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The on-disk format cannot be read by this engine
    #[error("Incompatible version: {0}")]
    IncompatibleVersion(String),

    /// A second concurrent writer was detected
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// The store outgrew its configured maximum size
    #[error("Map full: {used} bytes in use, limit is {limit} bytes")]
    MapFull { used: u64, limit: u64 },

    /// A stored record does not have the width of a point
    #[error("Corrupt record for {series} at {timestamp}: expected {expected} bytes, got {actual}")]
    CorruptRecord {
        series: SeriesId,
        timestamp: Timestamp,
        expected: usize,
        actual: usize,
    },

    /// Data corruption detected outside a single record
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Cursor call made while unbound, unpositioned or closed
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Environment or transaction used in a state that does not allow it
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Write attempted through a read-only transaction
    #[error("Write attempted through a read-only transaction")]
    ReadOnlyViolation,

    /// A point already exists at the timestamp
    #[error("Duplicate key: {series} already has a point at {timestamp}")]
    DuplicateKey {
        series: SeriesId,
        timestamp: Timestamp,
    },

    /// Any other failure reported by the underlying store
    #[error("Store error: {0}")]
    Store(String),
}

impl TickError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TickError::Io(_) | TickError::StorageUnavailable(_) | TickError::WriteConflict(_)
        )
    }

    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            TickError::CorruptRecord { .. } | TickError::Corruption(_)
        )
    }
}

impl From<redb::StorageError> for TickError {
    fn from(err: redb::StorageError) -> Self {
        match err {
            redb::StorageError::Io(e) => TickError::Io(e),
            redb::StorageError::Corrupted(msg) => TickError::Corruption(msg),
            other => TickError::Store(other.to_string()),
        }
    }
}

impl From<redb::DatabaseError> for TickError {
    fn from(err: redb::DatabaseError) -> Self {
        match err {
            redb::DatabaseError::DatabaseAlreadyOpen => {
                TickError::StorageUnavailable("store is already open by another handle".into())
            }
            redb::DatabaseError::UpgradeRequired(version) => TickError::IncompatibleVersion(
                format!("store file format {} requires an upgrade", version),
            ),
            redb::DatabaseError::Storage(redb::StorageError::Corrupted(msg)) => {
                TickError::IncompatibleVersion(format!("unreadable store file: {}", msg))
            }
            redb::DatabaseError::Storage(redb::StorageError::Io(e)) => {
                TickError::StorageUnavailable(e.to_string())
            }
            other => TickError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<redb::TransactionError> for TickError {
    fn from(err: redb::TransactionError) -> Self {
        match err {
            redb::TransactionError::Storage(e) => e.into(),
            other => TickError::Store(other.to_string()),
        }
    }
}

impl From<redb::TableError> for TickError {
    fn from(err: redb::TableError) -> Self {
        match err {
            redb::TableError::Storage(e) => e.into(),
            redb::TableError::TableDoesNotExist(name) => {
                TickError::IncompatibleVersion(format!("table {} is missing", name))
            }
            redb::TableError::TableAlreadyOpen(name, _) => TickError::InvalidOperation(format!(
                "table {} is already in use by another cursor operation",
                name
            )),
            other => TickError::IncompatibleVersion(other.to_string()),
        }
    }
}

impl From<redb::CommitError> for TickError {
    fn from(err: redb::CommitError) -> Self {
        match err {
            redb::CommitError::Storage(e) => e.into(),
            other => TickError::Store(other.to_string()),
        }
    }
}
