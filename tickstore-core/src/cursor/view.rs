//! Series-windowed reads over the shared points table

use crate::codec::{within_series, PointCodec, TimeseriesKey};
use crate::{Point, Result, SeriesId, Timestamp};
use redb::{ReadOnlyTable, ReadableTable, Table};
use std::ops::Bound;

pub(crate) type SnapshotTable = ReadOnlyTable<&'static [u8], &'static [u8]>;
pub(crate) type WritableTable<'txn> = Table<'txn, &'static [u8], &'static [u8]>;

/// Points decoded per table access during a scan
pub(crate) const SCAN_BATCH: usize = 256;

/// Which neighbour of a bound to read
#[derive(Debug, Clone, Copy)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

/// Decoded record at a position
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot<const N: usize> {
    Loaded(Point<N>),
    /// Record had the wrong length
    Corrupt(usize),
}

impl<const N: usize> Slot<N> {
    fn decode(key: &TimeseriesKey, record: &[u8]) -> Self {
        match PointCodec::<N>::decode(key, record) {
            Ok(point) => Slot::Loaded(point),
            Err(_) => Slot::Corrupt(record.len()),
        }
    }
}

/// Why a batch stopped filling
#[derive(Debug, Clone, Copy)]
pub(crate) enum BatchEnd<const N: usize> {
    /// Batch is full; the scan resumes after this key
    More(TimeseriesKey),
    /// No more keys in the series
    Exhausted,
    /// First key at or past the end timestamp
    Bound(TimeseriesKey, Slot<N>),
    /// Record of the wrong length
    Corrupt(TimeseriesKey, usize),
}

/// Points table as seen by one cursor operation
pub(crate) enum PointsView<'v, 'txn> {
    /// Table pinned to a read snapshot, kept open by the cursor
    Snapshot(&'v SnapshotTable),
    /// Table of the write transaction, opened for this operation only
    Writable(WritableTable<'txn>),
}

impl PointsView<'_, '_> {
    /// Nearest key of `series` past `from` in `direction`
    pub fn neighbour<const N: usize>(
        &self,
        series: SeriesId,
        from: Bound<&[u8]>,
        direction: Direction,
    ) -> Result<Option<(TimeseriesKey, Slot<N>)>> {
        match self {
            PointsView::Snapshot(table) => neighbour(*table, series, from, direction),
            PointsView::Writable(table) => neighbour(table, series, from, direction),
        }
    }

    /// Decode up to `limit` points of `series` from `from` onwards into `out`
    pub fn fill<const N: usize>(
        &self,
        series: SeriesId,
        from: Bound<&[u8]>,
        end: Option<Timestamp>,
        out: &mut Vec<Point<N>>,
        limit: usize,
    ) -> Result<BatchEnd<N>> {
        match self {
            PointsView::Snapshot(table) => fill(*table, series, from, end, out, limit),
            PointsView::Writable(table) => fill(table, series, from, end, out, limit),
        }
    }
}

/// Read the key next to `from` in the whole keyspace and keep it only if it
/// belongs to `series`.
pub(crate) fn neighbour<T, const N: usize>(
    table: &T,
    series: SeriesId,
    from: Bound<&[u8]>,
    direction: Direction,
) -> Result<Option<(TimeseriesKey, Slot<N>)>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let item = match direction {
        Direction::Forward => table.range::<&[u8]>((from, Bound::Unbounded))?.next(),
        Direction::Backward => table.range::<&[u8]>((Bound::Unbounded, from))?.next_back(),
    };
    let Some(item) = item else {
        return Ok(None);
    };

    let (key, record) = item?;
    if !within_series(key.value(), series) {
        return Ok(None);
    }
    let key = TimeseriesKey::from_slice(key.value())?;
    let slot = Slot::decode(&key, record.value());
    Ok(Some((key, slot)))
}

fn fill<T, const N: usize>(
    table: &T,
    series: SeriesId,
    from: Bound<&[u8]>,
    end: Option<Timestamp>,
    out: &mut Vec<Point<N>>,
    limit: usize,
) -> Result<BatchEnd<N>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    for item in table.range::<&[u8]>((from, Bound::Unbounded))? {
        let (key, record) = item?;
        if !within_series(key.value(), series) {
            break;
        }
        let key = TimeseriesKey::from_slice(key.value())?;
        let slot = Slot::<N>::decode(&key, record.value());
        if matches!(end, Some(end) if key.timestamp() >= end) {
            return Ok(BatchEnd::Bound(key, slot));
        }
        match slot {
            Slot::Loaded(point) => {
                out.push(point);
                if out.len() >= limit {
                    return Ok(BatchEnd::More(key));
                }
            }
            Slot::Corrupt(record_len) => return Ok(BatchEnd::Corrupt(key, record_len)),
        }
    }
    Ok(BatchEnd::Exhausted)
}
