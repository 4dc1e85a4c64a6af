//! Composite key encoding

use crate::{Result, SeriesId, TickError, Timestamp};
use std::fmt;

/// Length of the series id prefix
pub const SERIES_LEN: usize = 16;

/// Length of an encoded key
pub const KEY_LEN: usize = SERIES_LEN + 8;

/// Encoded `(series, timestamp)` key
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeseriesKey([u8; KEY_LEN]);

impl TimeseriesKey {
    /// Encode a key
    pub fn new(series: SeriesId, timestamp: Timestamp) -> Self {
        let mut buf = [0u8; KEY_LEN];
        buf[..SERIES_LEN].copy_from_slice(series.as_bytes());
        buf[SERIES_LEN..].copy_from_slice(&timestamp.ticks().to_be_bytes());
        Self(buf)
    }

    /// Smallest key of a series
    pub fn first_of(series: SeriesId) -> Self {
        Self::new(series, Timestamp::MIN)
    }

    /// Largest key of a series
    pub fn last_of(series: SeriesId) -> Self {
        Self::new(series, Timestamp::MAX)
    }

    /// Decode a key read back from the store
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let buf: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            TickError::Corruption(format!(
                "key of {} bytes in the points table, expected {}",
                bytes.len(),
                KEY_LEN
            ))
        })?;
        Ok(Self(buf))
    }

    /// Series part of the key
    pub fn series(&self) -> SeriesId {
        let mut id = [0u8; SERIES_LEN];
        id.copy_from_slice(&self.0[..SERIES_LEN]);
        SeriesId::from_bytes(id)
    }

    /// Timestamp part of the key
    pub fn timestamp(&self) -> Timestamp {
        let mut ticks = [0u8; 8];
        ticks.copy_from_slice(&self.0[SERIES_LEN..]);
        Timestamp::new(u64::from_be_bytes(ticks))
    }

    /// Raw encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TimeseriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeseriesKey({}@{})", self.series(), self.timestamp())
    }
}

/// Check whether an encoded key belongs to `series`.
///
/// Every cursor navigation clamps its result through this predicate; it is
/// the only place that knows where one series' key range ends.
pub fn within_series(key: &[u8], series: SeriesId) -> bool {
    key.len() == KEY_LEN && key[..SERIES_LEN] == series.as_bytes()[..]
}
