//! Fixed-width point records

use super::TimeseriesKey;
use crate::{Point, Result, TickError};
use bytes::{Buf, BufMut, BytesMut};
use std::marker::PhantomData;

/// Codec for the record of a point with `N` fields.
///
/// Layout, all little-endian:
/// - 8 bytes: flags
/// - 8 bytes per field: `f64` bits
pub struct PointCodec<const N: usize>(PhantomData<[f64; N]>);

impl<const N: usize> PointCodec<N> {
    /// Encoded record length
    pub const RECORD_LEN: usize = 8 + 8 * N;

    /// Encode the record of `point` into `buf`, replacing its contents
    pub fn encode_into(point: &Point<N>, buf: &mut BytesMut) {
        buf.clear();
        buf.reserve(Self::RECORD_LEN);
        buf.put_u64_le(point.flags);
        for value in &point.values {
            buf.put_f64_le(*value);
        }
    }

    /// Decode a record stored under `key`
    pub fn decode(key: &TimeseriesKey, record: &[u8]) -> Result<Point<N>> {
        if record.len() != Self::RECORD_LEN {
            return Err(TickError::CorruptRecord {
                series: key.series(),
                timestamp: key.timestamp(),
                expected: Self::RECORD_LEN,
                actual: record.len(),
            });
        }

        let mut buf = record;
        let flags = buf.get_u64_le();
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = buf.get_f64_le();
        }

        Ok(Point {
            timestamp: key.timestamp(),
            flags,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SeriesId, Timestamp};

    #[test]
    fn test_record_layout() {
        let point = Point::new(9u64, 0x0102, [1.5, -2.0, 3.25]);
        let mut buf = BytesMut::new();
        PointCodec::<3>::encode_into(&point, &mut buf);

        assert_eq!(buf.len(), PointCodec::<3>::RECORD_LEN);
        assert_eq!(&buf[..8], &0x0102u64.to_le_bytes());
        assert_eq!(&buf[8..16], &1.5f64.to_le_bytes());

        let key = TimeseriesKey::new(SeriesId::from_u128(3), Timestamp::new(9));
        let decoded = PointCodec::<3>::decode(&key, &buf).unwrap();
        assert!(decoded.same_bits(&point));
    }

    #[test]
    fn test_encode_reuses_buffer() {
        let mut buf = BytesMut::new();
        PointCodec::<1>::encode_into(&Point::new(1u64, 7, [1.0]), &mut buf);
        PointCodec::<1>::encode_into(&Point::new(2u64, 8, [2.0]), &mut buf);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[..8], &8u64.to_le_bytes());
    }

    #[test]
    fn test_decode_length_mismatch() {
        let key = TimeseriesKey::new(SeriesId::from_u128(3), Timestamp::new(11));
        let err = PointCodec::<2>::decode(&key, &[0u8; 16]).unwrap_err();
        match err {
            TickError::CorruptRecord {
                timestamp,
                expected,
                actual,
                ..
            } => {
                assert_eq!(timestamp, Timestamp::new(11));
                assert_eq!(expected, 24);
                assert_eq!(actual, 16);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
