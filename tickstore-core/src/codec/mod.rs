//! Byte encodings for keys and point records
//!
//! All series share one ordered table. A key is the series id followed by
//! the timestamp, both big-endian, so byte order groups points by series and
//! sorts them by time inside each group. The record holds everything else
//! about the point in fixed-width little-endian words.

pub mod key;
mod record;

pub use key::{within_series, TimeseriesKey, KEY_LEN};
pub use record::PointCodec;
