//! # Key Map Module
//!
//! The join key index: a byte-keyed map from serialized join-key tuples to
//! fixed-width 64-bit value slots. The ASOF join stores one row id per key;
//! the second slot of the declared layout belongs to the full join variant's
//! record-chain encoding and stays untouched here.
//!
//! Keys are produced by a [`KeySerializer`] so that master and slave rows
//! with joinable values hash to byte-equal keys.

mod key;

pub use key::{ColumnKeySerializer, KeySerializer};

use arrow_schema::DataType;
use fxhash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::cursor::Record;

/// Inline join-key buffer. 24 bytes holds typical symbol keys and any pair
/// of fixed-width columns without touching the heap.
pub type JoinKey = SmallVec<[u8; 24]>;

/// Fixed-width map value: a small row of 64-bit slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapValue {
    longs: SmallVec<[i64; 2]>,
}

impl MapValue {
    fn zeroed(width: usize) -> Self {
        Self {
            longs: smallvec![0; width],
        }
    }

    /// Write `value` into `slot`.
    ///
    /// # Panics
    ///
    /// Panics when `slot` exceeds the width declared at map construction.
    pub fn put_long(&mut self, slot: usize, value: i64) {
        self.longs[slot] = value;
    }

    /// Read the value at `slot`.
    ///
    /// # Panics
    ///
    /// Panics when `slot` exceeds the width declared at map construction.
    #[must_use]
    pub fn long(&self, slot: usize) -> i64 {
        self.longs[slot]
    }
}

/// Byte-keyed index from join-key tuples to [`MapValue`] slots.
///
/// Key column types and the value width are fixed at construction. The map
/// can be [`close`](JoinKeyMap::close)d between executions to give back its
/// backing storage and [`reopen`](JoinKeyMap::reopen)ed on the next bind.
pub struct JoinKeyMap {
    key_types: Vec<DataType>,
    value_longs: usize,
    entries: Option<FxHashMap<JoinKey, MapValue>>,
}

impl JoinKeyMap {
    /// Creates an open, empty map for the given key column types and value
    /// slot count.
    #[must_use]
    pub fn new(key_types: Vec<DataType>, value_longs: usize) -> Self {
        Self {
            key_types,
            value_longs,
            entries: Some(FxHashMap::default()),
        }
    }

    /// The key column types declared at construction.
    #[must_use]
    pub fn key_types(&self) -> &[DataType] {
        &self.key_types
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Whether the backing storage is currently allocated.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.entries.is_some()
    }

    /// Remove every entry, keeping capacity.
    pub fn clear(&mut self) {
        self.entries_mut().clear();
    }

    /// Release the backing storage.
    pub fn close(&mut self) {
        self.entries = None;
    }

    /// Reacquire backing storage after a [`close`](JoinKeyMap::close).
    /// No-op on an open map.
    pub fn reopen(&mut self) {
        if self.entries.is_none() {
            self.entries = Some(FxHashMap::default());
        }
    }

    /// Begin key construction for `record`: the serializer writes the key
    /// bytes and the returned handle resolves them against the map.
    pub fn with_key(
        &mut self,
        record: &dyn Record,
        serializer: &dyn KeySerializer,
    ) -> MapKey<'_> {
        let mut key = JoinKey::new();
        serializer.write(record, &mut key);
        MapKey { map: self, key }
    }

    fn entries(&self) -> &FxHashMap<JoinKey, MapValue> {
        self.entries.as_ref().expect("join key map used after close")
    }

    fn entries_mut(&mut self) -> &mut FxHashMap<JoinKey, MapValue> {
        self.entries.as_mut().expect("join key map used after close")
    }
}

/// A serialized key paired with the map it resolves against.
pub struct MapKey<'a> {
    map: &'a mut JoinKeyMap,
    key: JoinKey,
}

impl<'a> MapKey<'a> {
    /// The serialized key bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.key
    }

    /// Resolve to a mutable value slot, creating a zeroed one for a new key.
    /// For an existing key the caller's subsequent writes overwrite the old
    /// slots, so the newest insertion wins.
    pub fn create_value(self) -> &'a mut MapValue {
        let MapKey { map, key } = self;
        let width = map.value_longs;
        map.entries_mut()
            .entry(key)
            .or_insert_with(|| MapValue::zeroed(width))
    }

    /// Read-only lookup; `None` when the key is absent.
    #[must_use]
    pub fn find_value(self) -> Option<&'a MapValue> {
        let MapKey { map, key } = self;
        map.entries().get(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{NULL_LONG, NULL_ROW_ID};

    /// Minimal record over one long column and one string column.
    struct KeyedRecord {
        id: i64,
        sym: Option<&'static str>,
    }

    impl Record for KeyedRecord {
        fn long(&self, _col: usize) -> i64 {
            self.id
        }

        fn double(&self, _col: usize) -> f64 {
            f64::NAN
        }

        fn str(&self, _col: usize) -> Option<&str> {
            self.sym
        }

        fn row_id(&self) -> i64 {
            NULL_ROW_ID
        }
    }

    fn sym_serializer() -> ColumnKeySerializer {
        ColumnKeySerializer::new(vec![(1, DataType::Utf8)])
    }

    #[test]
    fn test_insert_and_find() {
        let mut map = JoinKeyMap::new(vec![DataType::Utf8], 2);
        let serializer = sym_serializer();
        let row = KeyedRecord {
            id: 1,
            sym: Some("AAPL"),
        };

        map.with_key(&row, &serializer).create_value().put_long(0, 42);

        let value = map.with_key(&row, &serializer).find_value().unwrap();
        assert_eq!(value.long(0), 42);
        assert_eq!(value.long(1), 0);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_newest_insertion_wins() {
        let mut map = JoinKeyMap::new(vec![DataType::Utf8], 2);
        let serializer = sym_serializer();
        let row = KeyedRecord {
            id: 1,
            sym: Some("AAPL"),
        };

        map.with_key(&row, &serializer).create_value().put_long(0, 7);
        map.with_key(&row, &serializer).create_value().put_long(0, 9);

        assert_eq!(map.len(), 1);
        let value = map.with_key(&row, &serializer).find_value().unwrap();
        assert_eq!(value.long(0), 9);
    }

    #[test]
    fn test_missing_key() {
        let mut map = JoinKeyMap::new(vec![DataType::Utf8], 2);
        let serializer = sym_serializer();
        let row = KeyedRecord {
            id: 1,
            sym: Some("GOOG"),
        };
        assert!(map.with_key(&row, &serializer).find_value().is_none());
    }

    #[test]
    fn test_null_key_is_a_key() {
        let mut map = JoinKeyMap::new(vec![DataType::Utf8], 2);
        let serializer = sym_serializer();
        let null_row = KeyedRecord { id: 1, sym: None };
        let real_row = KeyedRecord {
            id: 1,
            sym: Some("AAPL"),
        };

        map.with_key(&null_row, &serializer)
            .create_value()
            .put_long(0, 5);

        assert!(map.with_key(&real_row, &serializer).find_value().is_none());
        let value = map.with_key(&null_row, &serializer).find_value().unwrap();
        assert_eq!(value.long(0), 5);
    }

    #[test]
    fn test_clear_keeps_map_open() {
        let mut map = JoinKeyMap::new(vec![DataType::Utf8], 2);
        let serializer = sym_serializer();
        let row = KeyedRecord {
            id: 1,
            sym: Some("AAPL"),
        };

        map.with_key(&row, &serializer).create_value().put_long(0, 1);
        map.clear();

        assert!(map.is_open());
        assert!(map.is_empty());
        assert!(map.with_key(&row, &serializer).find_value().is_none());
    }

    #[test]
    fn test_close_then_reopen() {
        let mut map = JoinKeyMap::new(vec![DataType::Int64], 2);
        let serializer = ColumnKeySerializer::new(vec![(0, DataType::Int64)]);
        let row = KeyedRecord { id: 3, sym: None };

        map.with_key(&row, &serializer).create_value().put_long(0, 1);
        map.close();
        assert!(!map.is_open());

        map.reopen();
        assert!(map.is_open());
        assert!(map.is_empty());
    }

    #[test]
    fn test_long_keys_spill_off_the_inline_buffer() {
        let mut map = JoinKeyMap::new(vec![DataType::Utf8], 1);
        let serializer = sym_serializer();
        let row = KeyedRecord {
            id: 1,
            sym: Some("a-join-key-well-beyond-twenty-four-bytes"),
        };
        map.with_key(&row, &serializer)
            .create_value()
            .put_long(0, NULL_LONG);
        assert_eq!(
            map.with_key(&row, &serializer).find_value().unwrap().long(0),
            NULL_LONG
        );
    }
}
