//! Transactions - bounded units of work against the store

use super::environment::{Shared, WriterSlot};
use crate::cursor::TimeseriesCursor;
use crate::codec::KEY_LEN;
use crate::{config, Result, SeriesId, TickError};
use std::cell::Cell;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bytes a B-tree entry is assumed to cost beyond its key and record
const ENTRY_OVERHEAD: u64 = 16;

/// Kind of transaction to begin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Read-write
    #[default]
    Default,
    /// Snapshot reader
    ReadOnly,
}

/// Transaction lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// Underlying store transaction
pub(crate) enum Handle {
    Read(redb::ReadTransaction),
    Write(redb::WriteTransaction),
}

/// A read-only or read-write unit of work.
///
/// Cursors borrow the transaction, so every cursor is gone before the
/// transaction can be committed or aborted.
pub struct Transaction<const N: usize = 1> {
    shared: Arc<Shared>,
    id: u64,
    mode: TransactionMode,
    handle: Option<Handle>,
    state: TransactionState,
    /// Store file length when the writer started
    baseline: u64,
    /// Store file length at the last capacity refresh
    file_len: Cell<u64>,
    inserts: Cell<u64>,
    /// Estimated bytes added by this transaction
    written: Cell<u64>,
}

impl<const N: usize> Transaction<N> {
    pub(crate) fn begin(shared: Arc<Shared>, mode: TransactionMode) -> Result<Self> {
        if mode == TransactionMode::Default && shared.options.read_only {
            return Err(TickError::StorageUnavailable(
                "environment was opened read-only".into(),
            ));
        }

        let id = shared.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        let db = shared.acquire()?;
        let opened = Self::open_handle(&shared, &db, mode, id);
        drop(db);
        let (handle, baseline) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                shared.release();
                return Err(e);
            }
        };

        debug!("Began {:?} transaction {}", mode, id);

        Ok(Self {
            shared,
            id,
            mode,
            handle: Some(handle),
            state: TransactionState::Active,
            baseline,
            file_len: Cell::new(baseline),
            inserts: Cell::new(0),
            written: Cell::new(0),
        })
    }

    /// Start the store transaction; writers also return the file length
    fn open_handle(
        shared: &Shared,
        db: &redb::Database,
        mode: TransactionMode,
        id: u64,
    ) -> Result<(Handle, u64)> {
        if mode == TransactionMode::ReadOnly {
            return Ok((Handle::Read(db.begin_read()?), 0));
        }

        let thread = std::thread::current().id();
        if let Some(slot) = *shared.writer.lock() {
            if slot.thread == thread {
                return Err(TickError::WriteConflict(format!(
                    "transaction {} already writes on this thread",
                    slot.transaction_id
                )));
            }
        }

        // Blocks while another thread writes
        let txn = db.begin_write()?;
        let baseline = std::fs::metadata(shared.options.path())?.len();

        let mut writer = shared.writer.lock();
        if let Some(slot) = *writer {
            return Err(TickError::WriteConflict(format!(
                "transaction {} still registered as writer",
                slot.transaction_id
            )));
        }
        *writer = Some(WriterSlot {
            transaction_id: id,
            thread,
        });
        Ok((Handle::Write(txn), baseline))
    }

    /// Transaction id, unique within the environment
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mode the transaction was started in
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Whether this is a snapshot reader
    pub fn is_read_only(&self) -> bool {
        self.mode == TransactionMode::ReadOnly
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Open a cursor bound to `series`
    pub fn open_timeseries(&self, series: SeriesId) -> Result<TimeseriesCursor<'_, N>> {
        TimeseriesCursor::open(self, series)
    }

    /// Make all writes durable and visible to later transactions.
    ///
    /// For a read-only transaction this is the same as `close`.
    pub fn commit(&mut self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(TickError::InvalidOperation(format!(
                "transaction {} is already {:?}",
                self.id, self.state
            )));
        }

        if let Some(Handle::Write(_)) = &self.handle {
            if self.written.get() > 0 {
                self.refresh_file_len()?;
                self.check_capacity(self.written.get())?;
            }
            self.verify_writer()?;
        }

        match self.handle.take() {
            Some(Handle::Write(txn)) => {
                self.release_writer();
                let result = txn.commit();
                match result {
                    Ok(()) => {
                        self.finish(TransactionState::Committed);
                        debug!(
                            "Committed transaction {} ({} inserts)",
                            self.id,
                            self.inserts.get()
                        );
                        Ok(())
                    }
                    Err(e) => {
                        self.finish(TransactionState::Aborted);
                        Err(e.into())
                    }
                }
            }
            Some(Handle::Read(txn)) => {
                drop(txn);
                self.finish(TransactionState::Committed);
                Ok(())
            }
            None => Err(TickError::InvalidOperation(format!(
                "transaction {} has no store handle",
                self.id
            ))),
        }
    }

    /// Discard uncommitted writes or release the snapshot.
    ///
    /// A no-op once the transaction has ended.
    pub fn abort(&mut self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Ok(());
        }

        let result = match self.handle.take() {
            Some(Handle::Write(txn)) => {
                self.release_writer();
                txn.abort()
            }
            Some(Handle::Read(txn)) => {
                drop(txn);
                Ok(())
            }
            None => Ok(()),
        };

        self.finish(TransactionState::Aborted);
        debug!("Aborted transaction {}", self.id);
        result.map_err(TickError::from)
    }

    /// Same as `abort`
    pub fn close(&mut self) -> Result<()> {
        self.abort()
    }

    /// End the transaction and continue in a fresh one of the same mode.
    ///
    /// Writers commit; readers release their snapshot and take a new one.
    /// Bulk loads call this periodically to bound the size of a single
    /// write transaction.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.commit()?;
        *self = Self::begin(Arc::clone(&self.shared), self.mode)?;
        Ok(())
    }

    pub(crate) fn handle(&self) -> Result<&Handle> {
        self.handle.as_ref().ok_or_else(|| {
            TickError::InvalidOperation(format!("transaction {} has ended", self.id))
        })
    }

    /// The write transaction, or `ReadOnlyViolation` for readers
    pub(crate) fn writer(&self) -> Result<&redb::WriteTransaction> {
        match self.handle()? {
            Handle::Write(txn) => Ok(txn),
            Handle::Read(_) => Err(TickError::ReadOnlyViolation),
        }
    }

    /// Account for one more entry with a record of `record_len` bytes.
    ///
    /// Fails with `MapFull`, before anything is written, when the entry would
    /// take the store past its size limit. The estimate is kept in memory;
    /// the file length is re-read every `CAPACITY_CHECK_INTERVAL` entries.
    pub(crate) fn reserve(&self, record_len: usize) -> Result<()> {
        let inserts = self.inserts.get() + 1;
        if inserts % config::CAPACITY_CHECK_INTERVAL == 0 {
            self.refresh_file_len()?;
        }

        let cost = (KEY_LEN + record_len) as u64 + ENTRY_OVERHEAD;
        let written = self.written.get() + cost;
        self.check_capacity(written)?;

        self.inserts.set(inserts);
        self.written.set(written);
        Ok(())
    }

    fn refresh_file_len(&self) -> Result<()> {
        let len = std::fs::metadata(self.shared.options.path())?.len();
        self.file_len.set(len);
        Ok(())
    }

    /// Bytes the store would take with `written` bytes added by this transaction
    fn used(&self, written: u64) -> u64 {
        self.file_len.get().max(self.baseline.saturating_add(written))
    }

    fn check_capacity(&self, written: u64) -> Result<()> {
        let used = self.used(written);
        let limit = self.shared.max_size;
        if used > limit {
            return Err(TickError::MapFull { used, limit });
        }
        Ok(())
    }

    fn verify_writer(&self) -> Result<()> {
        match *self.shared.writer.lock() {
            Some(slot) if slot.transaction_id == self.id => Ok(()),
            Some(slot) => Err(TickError::WriteConflict(format!(
                "transaction {} found transaction {} registered as writer",
                self.id, slot.transaction_id
            ))),
            None => Err(TickError::WriteConflict(format!(
                "transaction {} is no longer registered as writer",
                self.id
            ))),
        }
    }

    fn release_writer(&self) {
        let mut writer = self.shared.writer.lock();
        if matches!(*writer, Some(slot) if slot.transaction_id == self.id) {
            *writer = None;
        }
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.shared.release();
    }
}

impl<const N: usize> Drop for Transaction<N> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            if self.mode == TransactionMode::Default {
                warn!("Transaction {} dropped without commit, aborting", self.id);
            }
            if let Err(e) = self.abort() {
                warn!("Abort of transaction {} failed: {}", self.id, e);
            }
        }
    }
}
