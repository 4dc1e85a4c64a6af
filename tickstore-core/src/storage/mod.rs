//! Storage environment and transactions over the ordered store

mod environment;
mod transaction;

pub use environment::{Environment, StoreStats};
pub use transaction::{Transaction, TransactionMode, TransactionState};

pub(crate) use transaction::Handle;

use crate::{Result, TickError};
use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store file format version
pub const FORMAT_VERSION: u32 = 1;

/// Magic bytes at the start of the stored header
pub const HEADER_MAGIC: [u8; 4] = *b"TICK";

/// All points of all series, keyed by `TimeseriesKey`
pub(crate) const POINTS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("points");

/// Store metadata
pub(crate) const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Key of the header inside `META_TABLE`
pub(crate) const HEADER_KEY: &str = "header";

/// Environment configuration
#[derive(Debug, Clone)]
pub struct EnvironmentOptions {
    /// Store file
    pub path: PathBuf,
    /// Create the store (and its parent directory) if it does not exist
    pub create_if_missing: bool,
    /// Only allow read-only transactions
    pub read_only: bool,
    /// Maximum bytes the store may grow to. `None` keeps the limit stored
    /// with the store, or `DEFAULT_MAX_SIZE` for a new one.
    pub max_size: Option<u64>,
    /// Page cache size in bytes
    pub cache_size: usize,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/tickstore.redb"),
            create_if_missing: true,
            read_only: false,
            max_size: None,
            cache_size: crate::config::DEFAULT_CACHE_SIZE,
        }
    }
}

impl EnvironmentOptions {
    /// Default options for the store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set whether a missing store is created
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Open for reading only
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the maximum store size.
    ///
    /// Recorded in the header when the store is created; on an existing store
    /// it overrides the recorded limit for this environment only.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Set the page cache size
    pub fn with_cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = bytes;
        self
    }

    pub(crate) fn validate(&self, field_count: usize) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(TickError::Configuration("store path is empty".into()));
        }
        if self.path.is_dir() {
            return Err(TickError::Configuration(format!(
                "store path {} is a directory",
                self.path.display()
            )));
        }
        if self.max_size == Some(0) {
            return Err(TickError::Configuration("max_size must be positive".into()));
        }
        if self.cache_size == 0 {
            return Err(TickError::Configuration("cache_size must be positive".into()));
        }
        if self.read_only && self.create_if_missing {
            return Err(TickError::Configuration(
                "a read-only environment cannot create its store".into(),
            ));
        }
        if field_count == 0 || field_count > crate::config::MAX_FIELDS {
            return Err(TickError::Configuration(format!(
                "points must have between 1 and {} fields, got {}",
                crate::config::MAX_FIELDS,
                field_count
            )));
        }
        Ok(())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

/// Header stored once per store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHeader {
    magic: [u8; 4],
    /// Format version the store was written with
    pub format_version: u32,
    /// Number of numeric fields per point
    pub field_count: u32,
    /// Size limit the store was created with
    pub max_size: u64,
    created_at_millis: i64,
}

impl StoreHeader {
    pub(crate) fn new(field_count: usize, max_size: u64) -> Self {
        Self {
            magic: HEADER_MAGIC,
            format_version: FORMAT_VERSION,
            field_count: field_count as u32,
            max_size,
            created_at_millis: Utc::now().timestamp_millis(),
        }
    }

    /// When the store was created
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at_millis)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TickError::Store(e.to_string()))
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let header: StoreHeader = bincode::deserialize(bytes)
            .map_err(|e| TickError::IncompatibleVersion(format!("unreadable header: {}", e)))?;
        if header.magic != HEADER_MAGIC {
            return Err(TickError::IncompatibleVersion("bad header magic".into()));
        }
        Ok(header)
    }

    /// Check that this engine can read the store
    pub(crate) fn check(&self, field_count: usize) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(TickError::IncompatibleVersion(format!(
                "store format {} is not supported, expected {}",
                self.format_version, FORMAT_VERSION
            )));
        }
        if self.max_size == 0 {
            return Err(TickError::IncompatibleVersion(
                "header records a zero size limit".into(),
            ));
        }
        if self.field_count as usize != field_count {
            return Err(TickError::IncompatibleVersion(format!(
                "store holds points with {} fields, engine expects {}",
                self.field_count, field_count
            )));
        }
        Ok(())
    }
}
