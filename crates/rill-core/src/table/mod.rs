//! # Table Module
//!
//! An in-memory, Arrow-backed record source. Rows are read positionally out
//! of a single `RecordBatch`; row ids are row offsets, which makes the
//! cursor's probe slot a plain second position into the same batch.
//!
//! This is the crate's reference [`RecordCursor`] implementation and the
//! driver for operator tests and benches. Supported column types: `Int64`,
//! `Timestamp(ms)`, `Float64`, `Utf8`.

use std::sync::Arc;

use arrow_array::{
    Array, Float64Array, Int64Array, RecordBatch, StringArray, TimestampMillisecondArray,
};
use arrow_schema::{DataType, SchemaRef, TimeUnit};

use crate::cursor::{
    CursorError, Record, RecordCursor, RecordCursorFactory, RecordMetadata, NULL_LONG,
};
use crate::exec::ExecutionContext;
use crate::plan::PlanSink;

/// An immutable in-memory table over one Arrow batch.
pub struct MemTable {
    batch: RecordBatch,
    timestamp_index: Option<usize>,
}

impl MemTable {
    /// Creates a table over `batch`, optionally ordered by the timestamp
    /// column at `timestamp_index`.
    #[must_use]
    pub fn new(batch: RecordBatch, timestamp_index: Option<usize>) -> Self {
        Self {
            batch,
            timestamp_index,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// The table schema.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Cursor metadata for this table.
    #[must_use]
    pub fn metadata(&self) -> RecordMetadata {
        match self.timestamp_index {
            Some(index) => RecordMetadata::with_timestamp(self.batch.schema(), index),
            None => RecordMetadata::new(self.batch.schema()),
        }
    }

    fn long_at(&self, col: usize, row: usize) -> i64 {
        let Some(array) = self.batch.columns().get(col) else {
            return NULL_LONG;
        };
        if array.is_null(row) {
            return NULL_LONG;
        }
        match array.data_type() {
            DataType::Int64 => array
                .as_any()
                .downcast_ref::<Int64Array>()
                .map_or(NULL_LONG, |a| a.value(row)),
            DataType::Timestamp(TimeUnit::Millisecond, _) => array
                .as_any()
                .downcast_ref::<TimestampMillisecondArray>()
                .map_or(NULL_LONG, |a| a.value(row)),
            _ => NULL_LONG,
        }
    }

    fn double_at(&self, col: usize, row: usize) -> f64 {
        let Some(array) = self.batch.columns().get(col) else {
            return f64::NAN;
        };
        if array.is_null(row) {
            return f64::NAN;
        }
        array
            .as_any()
            .downcast_ref::<Float64Array>()
            .map_or(f64::NAN, |a| a.value(row))
    }

    fn str_at(&self, col: usize, row: usize) -> Option<&str> {
        let array = self.batch.columns().get(col)?;
        if array.is_null(row) {
            return None;
        }
        array
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.value(row))
    }
}

/// A positioned row view into a [`MemTable`].
struct TableRecord {
    table: Arc<MemTable>,
    row: usize,
}

impl Record for TableRecord {
    fn long(&self, col: usize) -> i64 {
        self.table.long_at(col, self.row)
    }

    fn double(&self, col: usize) -> f64 {
        self.table.double_at(col, self.row)
    }

    fn str(&self, col: usize) -> Option<&str> {
        self.table.str_at(col, self.row)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn row_id(&self) -> i64 {
        self.row as i64
    }
}

/// Forward cursor over a [`MemTable`] with an independent probe slot.
pub struct MemTableCursor {
    row: TableRecord,
    probe: TableRecord,
    pos: i64,
    size: i64,
}

impl MemTableCursor {
    /// Creates a cursor positioned before the first row.
    #[allow(clippy::cast_possible_wrap)]
    #[must_use]
    pub fn new(table: Arc<MemTable>) -> Self {
        let size = table.len() as i64;
        Self {
            row: TableRecord {
                table: Arc::clone(&table),
                row: 0,
            },
            probe: TableRecord { table, row: 0 },
            pos: -1,
            size,
        }
    }
}

impl RecordCursor for MemTableCursor {
    #[allow(clippy::cast_sign_loss)]
    fn advance(&mut self) -> Result<bool, CursorError> {
        if self.pos + 1 >= self.size {
            return Ok(false);
        }
        self.pos += 1;
        self.row.row = self.pos as usize;
        Ok(true)
    }

    fn record(&self) -> &dyn Record {
        &self.row
    }

    fn probe(&self) -> &dyn Record {
        &self.probe
    }

    #[allow(clippy::cast_sign_loss)]
    fn probe_at(&mut self, row_id: i64) -> Result<(), CursorError> {
        if row_id < 0 || row_id >= self.size {
            return Err(CursorError::InvalidRowId(row_id));
        }
        self.probe.row = row_id as usize;
        Ok(())
    }

    fn rewind(&mut self) {
        self.pos = -1;
        self.row.row = 0;
    }

    fn size(&self) -> i64 {
        self.size
    }
}

/// Factory producing [`MemTableCursor`]s over a shared table.
pub struct MemTableFactory {
    table: Arc<MemTable>,
    metadata: RecordMetadata,
}

impl MemTableFactory {
    /// Creates a factory owning `table`.
    #[must_use]
    pub fn new(table: MemTable) -> Self {
        Self::shared(Arc::new(table))
    }

    /// Creates a factory over an already-shared table.
    #[must_use]
    pub fn shared(table: Arc<MemTable>) -> Self {
        let metadata = table.metadata();
        Self { table, metadata }
    }
}

impl RecordCursorFactory for MemTableFactory {
    fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    fn cursor(
        &mut self,
        _ctx: &mut ExecutionContext,
    ) -> Result<Box<dyn RecordCursor>, CursorError> {
        Ok(Box::new(MemTableCursor::new(Arc::clone(&self.table))))
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn to_plan(&self, sink: &mut PlanSink) {
        sink.node("Table scan");
        sink.attr("rows", &self.table.len());
    }
}
