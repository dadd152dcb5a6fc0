//! Join-key serialization.
//!
//! A [`KeySerializer`] projects a record into the stable byte shape used as
//! a [`JoinKeyMap`](super::JoinKeyMap) key. The master-side and slave-side
//! serializers of a join must produce byte-equal keys for rows that should
//! join, so both use the same per-type encoding.

use arrow_schema::DataType;

use super::JoinKey;
use crate::cursor::Record;

/// Deterministic, side-effect-free projection of a record into key bytes.
pub trait KeySerializer {
    /// Append the record's key bytes to `key`.
    fn write(&self, record: &dyn Record, key: &mut JoinKey);
}

/// Serializes a fixed list of columns, in order, into key bytes.
///
/// Encoding per column type:
/// - `Int64` / `Timestamp`: 8 little-endian bytes
/// - `Float64`: the 8 bit-pattern bytes (`NaN` keys only match `NaN` keys
///   with the same payload)
/// - `Utf8`: a presence byte, then a little-endian `u32` length, then the
///   UTF-8 bytes; the length prefix keeps multi-column keys unambiguous
pub struct ColumnKeySerializer {
    columns: Vec<(usize, DataType)>,
}

impl ColumnKeySerializer {
    /// Creates a serializer over `(column index, column type)` pairs.
    #[must_use]
    pub fn new(columns: Vec<(usize, DataType)>) -> Self {
        Self { columns }
    }
}

impl KeySerializer for ColumnKeySerializer {
    #[allow(clippy::cast_possible_truncation)]
    fn write(&self, record: &dyn Record, key: &mut JoinKey) {
        for (col, data_type) in &self.columns {
            match data_type {
                DataType::Utf8 => match record.str(*col) {
                    None => key.push(0),
                    Some(s) => {
                        key.push(1);
                        key.extend_from_slice(&(s.len() as u32).to_le_bytes());
                        key.extend_from_slice(s.as_bytes());
                    }
                },
                DataType::Float64 => {
                    key.extend_from_slice(&record.double(*col).to_bits().to_le_bytes());
                }
                DataType::Timestamp(_, _) => {
                    key.extend_from_slice(&record.timestamp(*col).to_le_bytes());
                }
                _ => key.extend_from_slice(&record.long(*col).to_le_bytes()),
            }
        }
    }
}
