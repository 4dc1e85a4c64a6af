//! Timeseries cursor
//!
//! A cursor walks one series of the shared points table. All series live
//! next to each other in the same ordered table, so every navigation reads
//! the neighbouring key of the whole keyspace and then clamps it to the bound
//! series with [`within_series`](crate::codec::within_series). Falling off
//! either end of the series leaves the cursor at `EndOfSeries`, even when the
//! table has keys of another series right behind it.

mod view;

use crate::codec::{PointCodec, TimeseriesKey};
use crate::storage::{Handle, Transaction, POINTS_TABLE};
use crate::{Point, Result, SeriesId, TickError, Timestamp};
use bytes::BytesMut;
use redb::ReadableTable;
use std::ops::Bound;
use view::{BatchEnd, Direction, PointsView, SnapshotTable, Slot, SCAN_BATCH};

/// Observable cursor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Closed
    Unbound,
    /// Bound to a series, no current point
    Bound,
    /// On a point of the bound series
    Positioned,
    /// Moved past either end of the bound series
    EndOfSeries,
}

/// Outcome of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// Positioned on a point at exactly the requested timestamp
    Exact,
    /// Positioned on the first point after the requested timestamp
    After,
    /// Positioned on the last point before the requested timestamp
    Before,
    /// The series has no point on the searched side of the timestamp
    EndOfSeries,
}

impl SearchResult {
    /// Whether the cursor is positioned on a point
    pub fn found(&self) -> bool {
        !matches!(self, SearchResult::EndOfSeries)
    }

    /// Whether the point is at exactly the requested timestamp
    pub fn is_exact(&self) -> bool {
        matches!(self, SearchResult::Exact)
    }
}

#[derive(Debug, Clone, Copy)]
enum State<const N: usize> {
    Unbound,
    Bound,
    Positioned { key: TimeseriesKey, slot: Slot<N> },
    EndOfSeries,
}

/// Cursor over the points of one series.
///
/// Obtained from [`Transaction::open_timeseries`]. Existing points are
/// overwritten by inserts at the same timestamp. Several cursors of one
/// transaction may be used side by side, including from inside a scan
/// callback of another cursor.
pub struct TimeseriesCursor<'txn, const N: usize = 1> {
    txn: &'txn Transaction<N>,
    series: SeriesId,
    state: State<N>,
    snapshot: Option<SnapshotTable>,
    scratch: BytesMut,
}

impl<'txn, const N: usize> TimeseriesCursor<'txn, N> {
    pub(crate) fn open(txn: &'txn Transaction<N>, series: SeriesId) -> Result<Self> {
        let snapshot = match txn.handle()? {
            Handle::Read(read) => Some(read.open_table(POINTS_TABLE)?),
            Handle::Write(_) => None,
        };

        Ok(Self {
            txn,
            series,
            state: State::Bound,
            snapshot,
            scratch: BytesMut::with_capacity(PointCodec::<N>::RECORD_LEN),
        })
    }

    /// Series the cursor is bound to
    pub fn series(&self) -> SeriesId {
        self.series
    }

    /// Current state
    pub fn state(&self) -> CursorState {
        match self.state {
            State::Unbound => CursorState::Unbound,
            State::Bound => CursorState::Bound,
            State::Positioned { .. } => CursorState::Positioned,
            State::EndOfSeries => CursorState::EndOfSeries,
        }
    }

    /// Whether the cursor is on a point
    pub fn is_positioned(&self) -> bool {
        matches!(self.state, State::Positioned { .. })
    }

    /// Rebind to another series.
    ///
    /// Behaves like closing and reopening: the position is dropped and the
    /// cursor is `Bound` to `series`.
    pub fn change_timeseries(&mut self, series: SeriesId) -> Result<()> {
        self.ensure_open("change_timeseries")?;
        self.series = series;
        self.state = State::Bound;
        Ok(())
    }

    /// Insert or overwrite the point at `timestamp` and move onto it
    pub fn insert(&mut self, timestamp: Timestamp, flags: u64, values: [f64; N]) -> Result<()> {
        self.insert_point(&Point {
            timestamp,
            flags,
            values,
        })
    }

    /// Insert or overwrite `point` and move onto it
    pub fn insert_point(&mut self, point: &Point<N>) -> Result<()> {
        self.write(point, true)
    }

    /// Insert a new point, failing with `DuplicateKey` if `timestamp` is taken
    pub fn try_insert(&mut self, timestamp: Timestamp, flags: u64, values: [f64; N]) -> Result<()> {
        self.try_insert_point(&Point {
            timestamp,
            flags,
            values,
        })
    }

    /// Insert `point`, failing with `DuplicateKey` if its timestamp is taken
    pub fn try_insert_point(&mut self, point: &Point<N>) -> Result<()> {
        self.write(point, false)
    }

    /// Delete the point at `timestamp`, returning whether it existed.
    ///
    /// The cursor is left `Bound`.
    pub fn remove(&mut self, timestamp: Timestamp) -> Result<bool> {
        self.ensure_open("remove")?;
        let txn = self.txn;
        let writer = txn.writer()?;
        let key = TimeseriesKey::new(self.series, timestamp);

        let mut table = writer.open_table(POINTS_TABLE)?;
        let removed = table.remove(key.as_bytes())?.is_some();
        drop(table);

        self.state = State::Bound;
        Ok(removed)
    }

    /// Delete every point of the bound series, returning how many there were
    pub fn clear(&mut self) -> Result<u64> {
        self.ensure_open("clear")?;
        let txn = self.txn;
        let writer = txn.writer()?;
        let first = TimeseriesKey::first_of(self.series);

        let mut removed = 0;
        {
            let mut table = writer.open_table(POINTS_TABLE)?;
            while let Some((key, _)) = view::neighbour::<_, N>(
                &table,
                self.series,
                Bound::Included(first.as_bytes()),
                Direction::Forward,
            )? {
                table.remove(key.as_bytes())?;
                removed += 1;
            }
        }
        self.state = State::Bound;
        Ok(removed)
    }

    /// Move to the first point at or after `timestamp`.
    ///
    /// When the series has no such point the cursor moves to `EndOfSeries`
    /// and the result is not `found`.
    pub fn search(&mut self, timestamp: Timestamp) -> Result<SearchResult> {
        self.ensure_open("search")?;
        let target = TimeseriesKey::new(self.series, timestamp);
        let entry = self.read_neighbour(Bound::Included(target.as_bytes()), Direction::Forward)?;
        self.land_search(entry, timestamp, SearchResult::After)
    }

    /// Move to the last point at or before `timestamp`
    pub fn search_at_or_before(&mut self, timestamp: Timestamp) -> Result<SearchResult> {
        self.ensure_open("search_at_or_before")?;
        let target = TimeseriesKey::new(self.series, timestamp);
        let entry = self.read_neighbour(Bound::Included(target.as_bytes()), Direction::Backward)?;
        self.land_search(entry, timestamp, SearchResult::Before)
    }

    /// Move to the first point of the series
    pub fn move_first(&mut self) -> Result<bool> {
        self.ensure_open("move_first")?;
        let first = TimeseriesKey::first_of(self.series);
        let entry = self.read_neighbour(Bound::Included(first.as_bytes()), Direction::Forward)?;
        self.land(entry)
    }

    /// Move to the last point of the series
    pub fn move_last(&mut self) -> Result<bool> {
        self.ensure_open("move_last")?;
        let last = TimeseriesKey::last_of(self.series);
        let entry = self.read_neighbour(Bound::Included(last.as_bytes()), Direction::Backward)?;
        self.land(entry)
    }

    /// Step to the next point; `false` once past the end of the series
    pub fn move_next(&mut self) -> Result<bool> {
        let key = self.position("move_next")?;
        let entry = self.read_neighbour(Bound::Excluded(key.as_bytes()), Direction::Forward)?;
        self.land(entry)
    }

    /// Step to the previous point; `false` once before the start of the series
    pub fn move_previous(&mut self) -> Result<bool> {
        let key = self.position("move_previous")?;
        let entry = self.read_neighbour(Bound::Excluded(key.as_bytes()), Direction::Backward)?;
        self.land(entry)
    }

    /// Point at the current position
    pub fn current(&self) -> Result<Point<N>> {
        match &self.state {
            State::Positioned {
                slot: Slot::Loaded(point),
                ..
            } => Ok(*point),
            State::Positioned {
                key,
                slot: Slot::Corrupt(len),
            } => Err(self.corrupt(key, *len)),
            State::Unbound => Err(TickError::InvalidPosition("cursor is closed".into())),
            State::Bound => Err(TickError::InvalidPosition(format!(
                "cursor on {} is not positioned",
                self.series
            ))),
            State::EndOfSeries => Err(TickError::InvalidPosition(format!(
                "cursor is past the end of {}",
                self.series
            ))),
        }
    }

    /// Visit every point from the current position to the end of the series.
    ///
    /// Returns the number of points visited and leaves the cursor at
    /// `EndOfSeries`; scanning again needs an explicit `move_first` or
    /// `search`. A corrupt record stops the scan with `CorruptRecord` and
    /// leaves the cursor on it.
    ///
    /// Points are read in batches and `visit` runs while no table is held
    /// open, so it may write through other cursors of the same transaction.
    /// Such writes at timestamps past the current batch are visited.
    pub fn for_each<F>(&mut self, visit: F) -> Result<u64>
    where
        F: FnMut(&Point<N>),
    {
        self.ensure_open("for_each")?;
        let start = match self.state {
            State::Positioned { key, .. } => key,
            State::EndOfSeries => return Ok(0),
            _ => {
                return Err(TickError::InvalidPosition(format!(
                    "for_each on {} needs a positioned cursor",
                    self.series
                )))
            }
        };
        self.scan(start, None, visit)
    }

    /// Visit every point at or after `start`.
    ///
    /// Same as `search(start)` followed by `for_each`; visits nothing when
    /// the series has no point at or after `start`.
    pub fn for_each_from<F>(&mut self, start: Timestamp, visit: F) -> Result<u64>
    where
        F: FnMut(&Point<N>),
    {
        if !self.search(start)?.found() {
            return Ok(0);
        }
        self.for_each(visit)
    }

    /// Visit the points with `start <= timestamp < end`.
    ///
    /// Afterwards the cursor is on the first point at or after `end`, or at
    /// `EndOfSeries` when there is none.
    pub fn for_each_range<F>(&mut self, start: Timestamp, end: Timestamp, visit: F) -> Result<u64>
    where
        F: FnMut(&Point<N>),
    {
        if !self.search(start)?.found() {
            return Ok(0);
        }
        let first = self.position("for_each_range")?;
        self.scan(first, Some(end), visit)
    }

    /// Release the cursor. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.state = State::Unbound;
        self.snapshot = None;
    }

    fn write(&mut self, point: &Point<N>, overwrite: bool) -> Result<()> {
        self.ensure_open("insert")?;
        let txn = self.txn;
        let writer = txn.writer()?;
        let key = TimeseriesKey::new(self.series, point.timestamp);
        PointCodec::<N>::encode_into(point, &mut self.scratch);

        {
            let mut table = writer.open_table(POINTS_TABLE)?;
            if !overwrite && table.get(key.as_bytes())?.is_some() {
                return Err(TickError::DuplicateKey {
                    series: self.series,
                    timestamp: point.timestamp,
                });
            }
            txn.reserve(PointCodec::<N>::RECORD_LEN)?;
            table.insert(key.as_bytes(), &self.scratch[..])?;
        }

        self.state = State::Positioned {
            key,
            slot: Slot::Loaded(*point),
        };
        Ok(())
    }

    /// Visit points from `start` (inclusive) up to `end` (exclusive) or the
    /// end of the series, one batch per table access.
    fn scan<F>(&mut self, start: TimeseriesKey, end: Option<Timestamp>, mut visit: F) -> Result<u64>
    where
        F: FnMut(&Point<N>),
    {
        let mut batch = Vec::with_capacity(SCAN_BATCH);
        let mut resume = Bound::Included(start);
        let mut visited = 0;

        loop {
            batch.clear();
            let stop = {
                let view = self.view()?;
                let from = match &resume {
                    Bound::Included(key) => Bound::Included(key.as_bytes()),
                    Bound::Excluded(key) => Bound::Excluded(key.as_bytes()),
                    Bound::Unbounded => Bound::Unbounded,
                };
                view.fill(self.series, from, end, &mut batch, SCAN_BATCH)?
            };

            for point in &batch {
                visit(point);
            }
            visited += batch.len() as u64;

            match stop {
                BatchEnd::More(last) => resume = Bound::Excluded(last),
                BatchEnd::Exhausted => {
                    self.state = State::EndOfSeries;
                    return Ok(visited);
                }
                BatchEnd::Bound(key, slot) => {
                    self.state = State::Positioned { key, slot };
                    return Ok(visited);
                }
                BatchEnd::Corrupt(key, record_len) => {
                    self.state = State::Positioned {
                        key,
                        slot: Slot::Corrupt(record_len),
                    };
                    return Err(self.corrupt(&key, record_len));
                }
            }
        }
    }

    fn view(&self) -> Result<PointsView<'_, 'txn>> {
        match &self.snapshot {
            Some(table) => Ok(PointsView::Snapshot(table)),
            None => {
                let txn = self.txn;
                Ok(PointsView::Writable(txn.writer()?.open_table(POINTS_TABLE)?))
            }
        }
    }

    fn read_neighbour(
        &self,
        from: Bound<&[u8]>,
        direction: Direction,
    ) -> Result<Option<(TimeseriesKey, Slot<N>)>> {
        let view = self.view()?;
        view.neighbour(self.series, from, direction)
    }

    fn land(&mut self, entry: Option<(TimeseriesKey, Slot<N>)>) -> Result<bool> {
        match entry {
            None => {
                self.state = State::EndOfSeries;
                Ok(false)
            }
            Some((key, slot)) => {
                self.state = State::Positioned { key, slot };
                match slot {
                    Slot::Loaded(_) => Ok(true),
                    Slot::Corrupt(len) => Err(self.corrupt(&key, len)),
                }
            }
        }
    }

    fn land_search(
        &mut self,
        entry: Option<(TimeseriesKey, Slot<N>)>,
        timestamp: Timestamp,
        inexact: SearchResult,
    ) -> Result<SearchResult> {
        let exact = matches!(&entry, Some((key, _)) if key.timestamp() == timestamp);
        if self.land(entry)? {
            Ok(if exact { SearchResult::Exact } else { inexact })
        } else {
            Ok(SearchResult::EndOfSeries)
        }
    }

    fn position(&self, op: &str) -> Result<TimeseriesKey> {
        match self.state {
            State::Positioned { key, .. } => Ok(key),
            State::Unbound => Err(TickError::InvalidPosition(format!(
                "{} on a closed cursor",
                op
            ))),
            State::Bound | State::EndOfSeries => Err(TickError::InvalidPosition(format!(
                "{} on {} needs a positioned cursor",
                op, self.series
            ))),
        }
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if matches!(self.state, State::Unbound) {
            return Err(TickError::InvalidPosition(format!(
                "{} on a closed cursor",
                op
            )));
        }
        Ok(())
    }

    fn corrupt(&self, key: &TimeseriesKey, actual: usize) -> TickError {
        TickError::CorruptRecord {
            series: key.series(),
            timestamp: key.timestamp(),
            expected: PointCodec::<N>::RECORD_LEN,
            actual,
        }
    }
}
