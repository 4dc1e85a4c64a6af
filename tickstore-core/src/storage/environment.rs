//! Environment - owns the store handle and its lifecycle

use super::{
    EnvironmentOptions, StoreHeader, Transaction, TransactionMode, HEADER_KEY, META_TABLE,
    POINTS_TABLE,
};
use crate::{config, Result, TickError};
use parking_lot::{Mutex, RwLock};
use redb::{ReadableTable, ReadableTableMetadata};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::{debug, info};

/// The transaction currently holding the store's write lock
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriterSlot {
    pub transaction_id: u64,
    pub thread: ThreadId,
}

/// State shared between an environment and its transactions
pub(crate) struct Shared {
    pub db: RwLock<Option<Arc<redb::Database>>>,
    pub options: EnvironmentOptions,
    pub header: StoreHeader,
    /// Effective size limit: the option if given, else the header's
    pub max_size: u64,
    pub open_transactions: AtomicUsize,
    pub next_transaction_id: AtomicU64,
    pub writer: Mutex<Option<WriterSlot>>,
}

impl Shared {
    /// Count a new transaction and hand out the store handle.
    ///
    /// The count is taken under the read lock, so a concurrent `close` either
    /// sees it or has already taken the handle. The lock is not held while
    /// the caller blocks on the store.
    pub fn acquire(&self) -> Result<Arc<redb::Database>> {
        let db = self.db.read();
        let db = db
            .as_ref()
            .ok_or_else(|| TickError::InvalidOperation("environment is closed".into()))?;
        self.open_transactions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(db))
    }

    /// Undo `acquire` for a transaction that ended or never started
    pub fn release(&self) {
        self.open_transactions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An open store holding points with `N` numeric fields
pub struct Environment<const N: usize = 1> {
    shared: Arc<Shared>,
}

impl<const N: usize> Environment<N> {
    /// Open or create the store described by `options`
    pub fn open(options: EnvironmentOptions) -> Result<Self> {
        options.validate(N)?;

        let path = options.path();
        let existed = path.exists();
        if !existed {
            if !options.create_if_missing {
                return Err(TickError::StorageUnavailable(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TickError::StorageUnavailable(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let mut builder = redb::Builder::new();
        builder.set_cache_size(options.cache_size);
        let db = if existed {
            builder.open(path)?
        } else {
            builder.create(path)?
        };

        let header = if options.read_only {
            Self::read_header(&db)?
        } else {
            Self::prepare(&db, options.max_size.unwrap_or(config::DEFAULT_MAX_SIZE))?
        };
        header.check(N)?;
        let max_size = options.max_size.unwrap_or(header.max_size);

        info!(
            "Opened store {:?} ({} fields, max_size={}, read_only={})",
            path, N, max_size, options.read_only
        );

        Ok(Self {
            shared: Arc::new(Shared {
                db: RwLock::new(Some(Arc::new(db))),
                options,
                header,
                max_size,
                open_transactions: AtomicUsize::new(0),
                next_transaction_id: AtomicU64::new(1),
                writer: Mutex::new(None),
            }),
        })
    }

    /// Begin a transaction.
    ///
    /// Writers are serialized: a read-write transaction blocks until the
    /// current writer on another thread finishes. Asking for a second writer
    /// on the thread that already holds one fails with `WriteConflict`.
    pub fn begin_transaction(&self, mode: TransactionMode) -> Result<Transaction<N>> {
        Transaction::begin(Arc::clone(&self.shared), mode)
    }

    /// Release the store handle.
    ///
    /// Fails while transactions are open. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut db = self.shared.db.write();
        if db.is_none() {
            return Ok(());
        }

        let open = self.shared.open_transactions.load(Ordering::SeqCst);
        if open > 0 {
            return Err(TickError::InvalidOperation(format!(
                "cannot close environment with {} open transactions",
                open
            )));
        }

        db.take();
        info!("Closed store {:?}", self.path());
        Ok(())
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.shared.db.read().is_none()
    }

    /// Store path
    pub fn path(&self) -> &Path {
        self.shared.options.path()
    }

    /// Options the environment was opened with
    pub fn options(&self) -> &EnvironmentOptions {
        &self.shared.options
    }

    /// Header of the store
    pub fn header(&self) -> &StoreHeader {
        &self.shared.header
    }

    /// Size limit enforced on write transactions
    pub fn max_size(&self) -> u64 {
        self.shared.max_size
    }

    /// Number of transactions not yet committed or aborted
    pub fn open_transactions(&self) -> usize {
        self.shared.open_transactions.load(Ordering::SeqCst)
    }

    /// Store statistics from a fresh snapshot
    pub fn stats(&self) -> Result<StoreStats> {
        let points = {
            let guard = self.shared.db.read();
            let db = guard
                .as_ref()
                .ok_or_else(|| TickError::InvalidOperation("environment is closed".into()))?;
            let txn = db.begin_read()?;
            drop(guard);
            let table = txn.open_table(POINTS_TABLE)?;
            table.len()?
        };
        let file_bytes = std::fs::metadata(self.path())?.len();

        Ok(StoreStats {
            points,
            file_bytes,
            field_count: N,
            max_size: self.shared.max_size,
        })
    }

    /// Create missing tables and the header
    fn prepare(db: &redb::Database, max_size: u64) -> Result<StoreHeader> {
        let txn = db.begin_write()?;
        let header = {
            let points = txn.open_table(POINTS_TABLE)?;
            let mut meta = txn.open_table(META_TABLE)?;
            let stored = meta
                .get(HEADER_KEY)?
                .map(|bytes| StoreHeader::decode(bytes.value()));
            match stored {
                Some(header) => header?,
                None => {
                    if !points.is_empty()? {
                        return Err(TickError::IncompatibleVersion(
                            "store holds points but no header".into(),
                        ));
                    }
                    let header = StoreHeader::new(N, max_size);
                    meta.insert(HEADER_KEY, header.encode()?.as_slice())?;
                    debug!("Wrote header for new store ({} fields)", N);
                    header
                }
            }
        };
        txn.commit()?;
        Ok(header)
    }

    fn read_header(db: &redb::Database) -> Result<StoreHeader> {
        let txn = db.begin_read()?;
        txn.open_table(POINTS_TABLE)?;
        let meta = txn.open_table(META_TABLE)?;
        let bytes = meta
            .get(HEADER_KEY)?
            .ok_or_else(|| TickError::IncompatibleVersion("store has no header".into()))?;
        StoreHeader::decode(bytes.value())
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Points across all series
    pub points: u64,
    /// Size of the store file
    pub file_bytes: u64,
    /// Numeric fields per point
    pub field_count: usize,
    /// Size limit in effect
    pub max_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SeriesId, Timestamp};
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> EnvironmentOptions {
        EnvironmentOptions::new(dir.path().join("store").join("ticks.redb"))
    }

    #[test]
    fn test_open_creates_store() {
        let dir = TempDir::new().unwrap();
        let env = Environment::<2>::open(options(&dir)).unwrap();

        assert!(env.path().exists());
        assert_eq!(env.header().field_count, 2);
        let stats = env.stats().unwrap();
        assert_eq!(stats.points, 0);
        assert_eq!(stats.field_count, 2);
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let result = Environment::<1>::open(options(&dir).with_create_if_missing(false));
        assert!(matches!(result, Err(TickError::StorageUnavailable(_))));
    }

    #[test]
    fn test_reopen_with_other_width_is_incompatible() {
        let dir = TempDir::new().unwrap();
        {
            let env = Environment::<1>::open(options(&dir)).unwrap();
            env.close().unwrap();
        }
        let result = Environment::<3>::open(options(&dir));
        assert!(matches!(result, Err(TickError::IncompatibleVersion(_))));
    }

    #[test]
    fn test_reopen_keeps_max_size() {
        let dir = TempDir::new().unwrap();
        {
            let env = Environment::<1>::open(options(&dir).with_max_size(1 << 20)).unwrap();
            assert_eq!(env.max_size(), 1 << 20);
            env.close().unwrap();
        }

        {
            let env = Environment::<1>::open(options(&dir)).unwrap();
            assert_eq!(env.header().max_size, 1 << 20);
            assert_eq!(env.max_size(), 1 << 20);
            assert_eq!(env.stats().unwrap().max_size, 1 << 20);
            env.close().unwrap();
        }

        // An explicit limit applies to this environment only
        {
            let env = Environment::<1>::open(options(&dir).with_max_size(4 << 20)).unwrap();
            assert_eq!(env.header().max_size, 1 << 20);
            assert_eq!(env.max_size(), 4 << 20);
            env.close().unwrap();
        }
        let env = Environment::<1>::open(options(&dir)).unwrap();
        assert_eq!(env.max_size(), 1 << 20);
    }

    #[test]
    fn test_new_store_gets_default_max_size() {
        let dir = TempDir::new().unwrap();
        let env = Environment::<1>::open(options(&dir)).unwrap();
        assert_eq!(env.header().max_size, config::DEFAULT_MAX_SIZE);
        assert_eq!(env.max_size(), config::DEFAULT_MAX_SIZE);
    }

    #[test]
    fn test_garbage_file_is_incompatible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.redb");
        std::fs::write(&path, vec![0x5a; 8192]).unwrap();

        let result = Environment::<1>::open(EnvironmentOptions::new(&path));
        assert!(matches!(
            result,
            Err(TickError::IncompatibleVersion(_)) | Err(TickError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_close_with_open_transaction() {
        let dir = TempDir::new().unwrap();
        let env = Environment::<1>::open(options(&dir)).unwrap();

        let mut txn = env.begin_transaction(TransactionMode::ReadOnly).unwrap();
        assert_eq!(env.open_transactions(), 1);
        assert!(matches!(env.close(), Err(TickError::InvalidOperation(_))));

        txn.close().unwrap();
        assert_eq!(env.open_transactions(), 0);
        env.close().unwrap();
        env.close().unwrap();
        assert!(env.is_closed());

        let result = env.begin_transaction(TransactionMode::ReadOnly);
        assert!(matches!(result, Err(TickError::InvalidOperation(_))));
    }

    #[test]
    fn test_read_only_environment() {
        let dir = TempDir::new().unwrap();
        {
            let env = Environment::<1>::open(options(&dir)).unwrap();
            let mut txn = env.begin_transaction(TransactionMode::Default).unwrap();
            {
                let mut cursor = txn.open_timeseries(SeriesId::from_u128(1)).unwrap();
                cursor.insert(Timestamp::new(1), 0, [1.0]).unwrap();
            }
            txn.commit().unwrap();
        }

        let env = Environment::<1>::open(
            options(&dir)
                .with_create_if_missing(false)
                .with_read_only(true),
        )
        .unwrap();

        let result = env.begin_transaction(TransactionMode::Default);
        assert!(matches!(result, Err(TickError::StorageUnavailable(_))));

        let txn = env.begin_transaction(TransactionMode::ReadOnly).unwrap();
        let mut cursor = txn.open_timeseries(SeriesId::from_u128(1)).unwrap();
        assert!(cursor.move_first().unwrap());
        assert_eq!(cursor.current().unwrap().values, [1.0]);
    }

    #[test]
    fn test_second_handle_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let _env = Environment::<1>::open(options(&dir)).unwrap();
        let result = Environment::<1>::open(options(&dir));
        assert!(matches!(result, Err(TickError::StorageUnavailable(_))));
    }
}
