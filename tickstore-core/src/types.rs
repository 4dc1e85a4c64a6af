//! Core types for Tickstore

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one logical timeseries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesId(Uuid);

impl SeriesId {
    /// Generate a random series id
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build a series id from its 128-bit value
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Build a series id from its big-endian bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The 128-bit value
    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// Big-endian bytes, ordered the same way as the id itself
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// The underlying UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for SeriesId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically ordered tick value, the sort key within a series.
///
/// The engine attaches no unit to ticks. The chrono helpers treat them as
/// nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Smallest timestamp
    pub const MIN: Timestamp = Timestamp(0);
    /// Largest timestamp
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a timestamp from raw ticks
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Raw ticks
    pub const fn ticks(&self) -> u64 {
        self.0
    }

    /// Convert a UTC datetime, `None` before the epoch or past year 2262
    pub fn from_datetime(datetime: &DateTime<Utc>) -> Option<Self> {
        let nanos = datetime.timestamp_nanos_opt()?;
        u64::try_from(nanos).ok().map(Self)
    }

    /// Convert to a UTC datetime, `None` if the ticks do not fit
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let nanos = i64::try_from(self.0).ok()?;
        Some(DateTime::from_timestamp_nanos(nanos))
    }
}

impl From<u64> for Timestamp {
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One timestamped sample: flags plus `N` numeric fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point<const N: usize = 1> {
    /// Position within the series
    pub timestamp: Timestamp,
    /// Status bits
    pub flags: u64,
    /// Numeric fields
    pub values: [f64; N],
}

impl<const N: usize> Point<N> {
    /// Create a new point
    pub fn new(timestamp: impl Into<Timestamp>, flags: u64, values: [f64; N]) -> Self {
        Self {
            timestamp: timestamp.into(),
            flags,
            values,
        }
    }

    /// The first numeric field, if the point has any
    pub fn value(&self) -> Option<f64> {
        self.values.first().copied()
    }

    /// Bitwise equality of flags and fields, NaN payloads included
    pub fn same_bits(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.flags == other.flags
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl<const N: usize> Default for Point<N> {
    fn default() -> Self {
        Self {
            timestamp: Timestamp::MIN,
            flags: 0,
            values: [0.0; N],
        }
    }
}

impl<const N: usize> fmt::Display for Point<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} flags=0x{:x}", self.timestamp, self.flags)?;
        for value in &self.values {
            write!(f, " {}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_series_id_order_matches_bytes() {
        let a = SeriesId::from_u128(1);
        let b = SeriesId::from_u128(1 << 64);
        assert!(a < b);
        assert!(a.as_bytes() < b.as_bytes());
        assert_eq!(SeriesId::from_bytes(*b.as_bytes()), b);
    }

    #[test]
    fn test_timestamp_datetime() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let ts = Timestamp::from_datetime(&dt).unwrap();
        assert_eq!(ts.to_datetime().unwrap(), dt);

        let before_epoch = Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap();
        assert!(Timestamp::from_datetime(&before_epoch).is_none());
        assert!(Timestamp::MAX.to_datetime().is_none());
    }

    #[test]
    fn test_point_bits() {
        let nan = f64::from_bits(0x7ff8_0000_0000_0042);
        let a = Point::new(5u64, 1, [nan, 2.0]);
        let b = a;
        assert!(a.same_bits(&b));
        assert_ne!(a, b);
        assert_eq!(a.value().map(f64::to_bits), Some(nan.to_bits()));
    }
}
