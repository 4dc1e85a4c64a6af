//! Tickstore Core - Embedded Timeseries Storage Engine
//!
//! Stores fixed-width numeric points for many independent series inside a
//! single ordered, transactional key-value store.
//!
//! # Architecture
//!
//! - **Codec**: order-preserving `(series, timestamp)` keys and fixed-width
//!   point records
//! - **Environment**: owns the store file, its header and capacity limits
//! - **Transaction**: snapshot readers and a single serialized writer
//! - **Cursor**: navigation, search and insertion scoped to one series of
//!   the shared keyspace
//!
//! # Example
//!
//! ```no_run
//! use tickstore_core::storage::{Environment, EnvironmentOptions, TransactionMode};
//! use tickstore_core::{SeriesId, Timestamp};
//!
//! # fn main() -> tickstore_core::Result<()> {
//! let env = Environment::<1>::open(EnvironmentOptions::new("data/ticks.redb"))?;
//! let series = SeriesId::new_v4();
//!
//! let mut txn = env.begin_transaction(TransactionMode::Default)?;
//! {
//!     let mut cursor = txn.open_timeseries(series)?;
//!     cursor.insert(Timestamp::new(1), 0, [1.0])?;
//!     cursor.insert(Timestamp::new(2), 0, [2.0])?;
//! }
//! txn.commit()?;
//!
//! let txn = env.begin_transaction(TransactionMode::ReadOnly)?;
//! let mut cursor = txn.open_timeseries(series)?;
//! if cursor.search(Timestamp::new(2))?.found() {
//!     println!("{}", cursor.current()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod cursor;
pub mod storage;

mod error;
mod types;

pub use cursor::{CursorState, SearchResult, TimeseriesCursor};
pub use error::{Result, TickError};
pub use storage::{Environment, EnvironmentOptions, Transaction, TransactionMode};
pub use types::*;

/// Tickstore version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Default maximum store size (500GB)
    pub const DEFAULT_MAX_SIZE: u64 = 500 * 1024 * 1024 * 1024;

    /// Default page cache size (256MB)
    pub const DEFAULT_CACHE_SIZE: usize = 256 * 1024 * 1024;

    /// Inserts between two re-reads of the store file length by a writer
    pub const CAPACITY_CHECK_INTERVAL: u64 = 1024;

    /// Maximum numeric fields per point
    pub const MAX_FIELDS: usize = 64;
}
