//! Outer-join output records.
//!
//! [`OuterJoinRecord`] concatenates a live master row with either a real
//! slave row or a [`NullRecord`] shaped like the slave schema, so that
//! downstream projection reads one uniform row regardless of whether the
//! join matched.

use arrow_schema::SchemaRef;

use crate::cursor::{Record, NULL_LONG, NULL_ROW_ID};

/// A stateless, schema-shaped source of typed null values.
///
/// Built once from the slave metadata; every column reads as the engine
/// null for its type.
pub struct NullRecord {
    schema: SchemaRef,
}

impl NullRecord {
    /// Creates a null record shaped like `schema`.
    #[must_use]
    pub fn new(schema: SchemaRef) -> Self {
        Self { schema }
    }
}

impl Record for NullRecord {
    fn long(&self, col: usize) -> i64 {
        debug_assert!(col < self.schema.fields().len());
        NULL_LONG
    }

    fn double(&self, col: usize) -> f64 {
        debug_assert!(col < self.schema.fields().len());
        f64::NAN
    }

    fn str(&self, col: usize) -> Option<&str> {
        debug_assert!(col < self.schema.fields().len());
        None
    }

    fn row_id(&self) -> i64 {
        NULL_ROW_ID
    }
}

/// Joined output row: master columns below `column_split`, slave columns at
/// or above it.
///
/// `has_slave` selects which slave facade is exposed - the real slave row
/// or the null record. Slave-side column indices are rebased by
/// `column_split` before the read is routed.
pub struct OuterJoinRecord<'a> {
    master: &'a dyn Record,
    slave: &'a dyn Record,
    null_record: &'a NullRecord,
    column_split: usize,
    has_slave: bool,
}

impl<'a> OuterJoinRecord<'a> {
    /// Creates a joined row view.
    #[must_use]
    pub fn new(
        master: &'a dyn Record,
        slave: &'a dyn Record,
        null_record: &'a NullRecord,
        column_split: usize,
        has_slave: bool,
    ) -> Self {
        Self {
            master,
            slave,
            null_record,
            column_split,
            has_slave,
        }
    }

    /// Whether the slave side carries a real row.
    #[must_use]
    pub fn has_slave(&self) -> bool {
        self.has_slave
    }

    fn slave_side(&self) -> &'a dyn Record {
        if self.has_slave {
            self.slave
        } else {
            self.null_record
        }
    }
}

impl Record for OuterJoinRecord<'_> {
    fn long(&self, col: usize) -> i64 {
        if col < self.column_split {
            self.master.long(col)
        } else {
            self.slave_side().long(col - self.column_split)
        }
    }

    fn double(&self, col: usize) -> f64 {
        if col < self.column_split {
            self.master.double(col)
        } else {
            self.slave_side().double(col - self.column_split)
        }
    }

    fn str(&self, col: usize) -> Option<&str> {
        if col < self.column_split {
            self.master.str(col)
        } else {
            self.slave_side().str(col - self.column_split)
        }
    }

    fn timestamp(&self, col: usize) -> i64 {
        if col < self.column_split {
            self.master.timestamp(col)
        } else {
            self.slave_side().timestamp(col - self.column_split)
        }
    }

    // Random access on joined rows is not supported.
    fn row_id(&self) -> i64 {
        NULL_ROW_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    struct FixedRecord {
        longs: Vec<i64>,
        strs: Vec<Option<&'static str>>,
        row_id: i64,
    }

    impl Record for FixedRecord {
        fn long(&self, col: usize) -> i64 {
            self.longs[col]
        }

        #[allow(clippy::cast_precision_loss)]
        fn double(&self, col: usize) -> f64 {
            self.longs[col] as f64
        }

        fn str(&self, col: usize) -> Option<&str> {
            self.strs[col]
        }

        fn row_id(&self) -> i64 {
            self.row_id
        }
    }

    fn slave_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("bid", DataType::Float64, false),
        ]))
    }

    #[test]
    fn test_null_record_typed_nulls() {
        let null = NullRecord::new(slave_schema());
        assert_eq!(null.long(0), NULL_LONG);
        assert_eq!(null.timestamp(0), NULL_LONG);
        assert!(null.double(1).is_nan());
        assert!(null.str(1).is_none());
        assert_eq!(null.row_id(), NULL_ROW_ID);
    }

    #[test]
    fn test_routes_to_slave_when_matched() {
        let master = FixedRecord {
            longs: vec![100, 1],
            strs: vec![None, Some("AAPL")],
            row_id: 0,
        };
        let slave = FixedRecord {
            longs: vec![90, 150],
            strs: vec![None, None],
            row_id: 7,
        };
        let null = NullRecord::new(slave_schema());

        let joined = OuterJoinRecord::new(&master, &slave, &null, 2, true);
        assert!(joined.has_slave());
        assert_eq!(joined.long(0), 100);
        assert_eq!(joined.str(1), Some("AAPL"));
        assert_eq!(joined.long(2), 90);
        assert_eq!(joined.long(3), 150);
        assert_eq!(joined.row_id(), NULL_ROW_ID);
    }

    #[test]
    fn test_routes_to_null_when_unmatched() {
        let master = FixedRecord {
            longs: vec![100, 1],
            strs: vec![None, Some("AAPL")],
            row_id: 0,
        };
        let slave = FixedRecord {
            longs: vec![90, 150],
            strs: vec![None, None],
            row_id: 7,
        };
        let null = NullRecord::new(slave_schema());

        let joined = OuterJoinRecord::new(&master, &slave, &null, 2, false);
        assert!(!joined.has_slave());
        // Master side unaffected.
        assert_eq!(joined.long(0), 100);
        // Slave side reads nulls even though a probe row is attached.
        assert_eq!(joined.long(2), NULL_LONG);
        assert!(joined.double(3).is_nan());
    }
}
