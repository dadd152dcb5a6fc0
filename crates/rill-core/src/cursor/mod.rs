//! # Cursor Module
//!
//! Pull-based record access contracts shared by every operator in the
//! execution core.
//!
//! A [`RecordCursor`] iterates rows one at a time under operator control and
//! additionally exposes a *probe slot*: a second row handle that can be
//! repositioned by row id without disturbing the forward iteration position.
//! A [`RecordCursorFactory`] builds cursors per execution and describes
//! itself to a [`PlanSink`].
//!
//! Implementations supply the capability set; operators depend only on it.

use std::collections::HashSet;
use std::sync::Arc;

use arrow_schema::{Field, Schema, SchemaRef};

use crate::exec::CircuitBreaker;
use crate::plan::PlanSink;

/// Engine null for 64-bit integer columns.
pub const NULL_LONG: i64 = i64::MIN;

/// Sentinel row id meaning "no row". Outside the valid row-id domain.
pub const NULL_ROW_ID: i64 = NULL_LONG;

/// Errors raised by cursors during acquisition and iteration.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// The query was cancelled through the circuit breaker.
    #[error("query cancelled")]
    Cancelled,

    /// A random read referenced a row id outside the cursor's domain.
    #[error("row id {0} is out of range")]
    InvalidRowId(i64),

    /// The cursor does not support random access.
    #[error("random access is not supported by this cursor")]
    RandomAccessUnsupported,

    /// A source cursor could not be acquired at bind time.
    #[error("failed to acquire source cursor: {0}")]
    Acquire(String),
}

/// A single row exposed through typed column readers.
///
/// Column indices are positions in the owning source's schema. Null values
/// read as [`NULL_LONG`] for integer and timestamp columns, `NaN` for
/// doubles, and `None` for strings.
pub trait Record {
    /// Read a 64-bit integer column.
    fn long(&self, col: usize) -> i64;

    /// Read a 64-bit float column.
    fn double(&self, col: usize) -> f64;

    /// Read a string column.
    fn str(&self, col: usize) -> Option<&str>;

    /// Read a timestamp column in the engine's time unit.
    fn timestamp(&self, col: usize) -> i64 {
        self.long(col)
    }

    /// Stable row identifier, usable with [`RecordCursor::probe_at`].
    fn row_id(&self) -> i64;
}

/// A forward-only cursor over records, with a probe slot for random reads.
///
/// The forward position and the probe slot are independent: repositioning
/// the probe never retreats or advances the main iteration.
pub trait RecordCursor {
    /// Step to the next row. Returns `false` once the cursor is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates source iteration failures.
    fn advance(&mut self) -> Result<bool, CursorError>;

    /// The current forward-iteration row. Valid after `advance` returned
    /// `true`.
    fn record(&self) -> &dyn Record;

    /// The probe slot row. Valid after a successful [`probe_at`].
    ///
    /// [`probe_at`]: RecordCursor::probe_at
    fn probe(&self) -> &dyn Record;

    /// Position the probe slot on the row identified by `row_id`.
    ///
    /// # Errors
    ///
    /// [`CursorError::InvalidRowId`] if the id is outside the cursor's
    /// domain, [`CursorError::RandomAccessUnsupported`] if the cursor has no
    /// random access.
    fn probe_at(&mut self, row_id: i64) -> Result<(), CursorError>;

    /// Return to the first row. The next `advance` yields it again.
    fn rewind(&mut self);

    /// Number of rows, or `-1` when unknown without iterating.
    fn size(&self) -> i64 {
        -1
    }

    /// Bytes of state this cursor computed ahead of iteration.
    fn pre_computed_state_size(&self) -> i64 {
        0
    }

    /// Accumulate this cursor's row count into `counter`.
    ///
    /// The default uses [`size`] when known and otherwise drains the cursor,
    /// checking the circuit breaker per row.
    ///
    /// # Errors
    ///
    /// [`CursorError::Cancelled`] when the breaker trips mid-drain;
    /// iteration failures propagate.
    ///
    /// [`size`]: RecordCursor::size
    fn calculate_size(
        &mut self,
        breaker: &CircuitBreaker,
        counter: &mut Counter,
    ) -> Result<(), CursorError> {
        if let Ok(known) = u64::try_from(self.size()) {
            counter.add(known);
            return Ok(());
        }
        while self.advance()? {
            breaker.check()?;
            counter.add(1);
        }
        Ok(())
    }
}

/// Builds [`RecordCursor`] instances per execution and carries the source's
/// metadata between executions.
pub trait RecordCursorFactory {
    /// Metadata describing the rows this factory's cursors produce.
    fn metadata(&self) -> &RecordMetadata;

    /// Acquire a fresh cursor for one execution.
    ///
    /// # Errors
    ///
    /// [`CursorError::Acquire`] when the underlying source cannot be opened.
    fn cursor(
        &mut self,
        ctx: &mut crate::exec::ExecutionContext,
    ) -> Result<Box<dyn RecordCursor>, CursorError>;

    /// Whether cursors from this factory support [`RecordCursor::probe_at`].
    fn supports_random_access(&self) -> bool {
        false
    }

    /// Whether this factory's output order already satisfies the query's
    /// ORDER BY advice.
    fn followed_order_by_advice(&self) -> bool {
        false
    }

    /// Direction in which this factory scans its source.
    fn scan_direction(&self) -> ScanDirection {
        ScanDirection::Forward
    }

    /// Describe this operator (and its children) to a plan sink.
    fn to_plan(&self, sink: &mut PlanSink);
}

/// Scan direction reported by a cursor factory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanDirection {
    /// Ascending designated-timestamp order.
    #[default]
    Forward,
    /// Descending designated-timestamp order.
    Backward,
}

/// Row-count accumulator used by size calculation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Counter {
    value: u64,
}

impl Counter {
    /// Creates a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` rows.
    pub fn add(&mut self, delta: u64) {
        self.value += delta;
    }

    /// The accumulated row count.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Schema plus designated-timestamp position for one record source.
#[derive(Clone, Debug)]
pub struct RecordMetadata {
    schema: SchemaRef,
    timestamp_index: Option<usize>,
}

impl RecordMetadata {
    /// Metadata for a source without a designated timestamp.
    #[must_use]
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            timestamp_index: None,
        }
    }

    /// Metadata for a source ordered by the timestamp column at
    /// `timestamp_index`.
    #[must_use]
    pub fn with_timestamp(schema: SchemaRef, timestamp_index: usize) -> Self {
        Self {
            schema,
            timestamp_index: Some(timestamp_index),
        }
    }

    /// The source schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Position of the designated timestamp column, if any.
    #[must_use]
    pub fn timestamp_index(&self) -> Option<usize> {
        self.timestamp_index
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.schema.fields().len()
    }

    /// Metadata of a master-then-slave joined row.
    ///
    /// Slave fields become nullable (the join may null-extend them) and
    /// duplicate names get a numeric suffix. The joined row keeps the
    /// master's timestamp order, so the master timestamp index carries over.
    #[must_use]
    pub fn joined(master: &Self, slave: &Self) -> Self {
        let mut fields: Vec<Field> = master
            .schema
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        let mut names: HashSet<String> = fields.iter().map(|f| f.name().clone()).collect();
        for field in slave.schema.fields() {
            let mut f = field.as_ref().clone().with_nullable(true);
            if names.contains(f.name()) {
                let base = f.name().clone();
                let mut suffix = 1u32;
                let mut candidate = format!("{base}{suffix}");
                while names.contains(&candidate) {
                    suffix += 1;
                    candidate = format!("{base}{suffix}");
                }
                f = f.with_name(candidate);
            }
            names.insert(f.name().clone());
            fields.push(f);
        }
        Self {
            schema: Arc::new(Schema::new(fields)),
            timestamp_index: master.timestamp_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;

    #[test]
    fn test_counter() {
        let mut counter = Counter::new();
        counter.add(3);
        counter.add(2);
        assert_eq!(counter.value(), 5);
    }

    #[test]
    fn test_joined_metadata() {
        let master = RecordMetadata::with_timestamp(
            Arc::new(Schema::new(vec![
                Field::new("ts", DataType::Int64, false),
                Field::new("sym", DataType::Utf8, false),
            ])),
            0,
        );
        let slave = RecordMetadata::with_timestamp(
            Arc::new(Schema::new(vec![
                Field::new("ts", DataType::Int64, false),
                Field::new("bid", DataType::Float64, false),
            ])),
            0,
        );

        let joined = RecordMetadata::joined(&master, &slave);
        assert_eq!(joined.column_count(), 4);
        assert_eq!(joined.timestamp_index(), Some(0));

        let schema = joined.schema();
        assert_eq!(schema.field(0).name(), "ts");
        assert_eq!(schema.field(1).name(), "sym");
        // Duplicate slave name gets a suffix and turns nullable.
        assert_eq!(schema.field(2).name(), "ts1");
        assert!(schema.field(2).is_nullable());
        assert_eq!(schema.field(3).name(), "bid");
        assert!(schema.field(3).is_nullable());
    }

    struct EmptyRecord;

    impl Record for EmptyRecord {
        fn long(&self, _col: usize) -> i64 {
            NULL_LONG
        }

        fn double(&self, _col: usize) -> f64 {
            f64::NAN
        }

        fn str(&self, _col: usize) -> Option<&str> {
            None
        }

        fn row_id(&self) -> i64 {
            NULL_ROW_ID
        }
    }

    /// Cursor of `remaining` rows that does not know its size up front.
    struct DrainOnlyCursor {
        remaining: u64,
        record: EmptyRecord,
    }

    impl RecordCursor for DrainOnlyCursor {
        fn advance(&mut self) -> Result<bool, CursorError> {
            if self.remaining == 0 {
                return Ok(false);
            }
            self.remaining -= 1;
            Ok(true)
        }

        fn record(&self) -> &dyn Record {
            &self.record
        }

        fn probe(&self) -> &dyn Record {
            &self.record
        }

        fn probe_at(&mut self, _row_id: i64) -> Result<(), CursorError> {
            Err(CursorError::RandomAccessUnsupported)
        }

        fn rewind(&mut self) {}
    }

    #[test]
    fn test_calculate_size_drains_unknown_cursor() {
        let mut cursor = DrainOnlyCursor {
            remaining: 7,
            record: EmptyRecord,
        };
        let mut counter = Counter::new();
        cursor
            .calculate_size(&CircuitBreaker::new(), &mut counter)
            .unwrap();
        assert_eq!(counter.value(), 7);
    }

    #[test]
    fn test_calculate_size_observes_cancellation() {
        let mut cursor = DrainOnlyCursor {
            remaining: 100,
            record: EmptyRecord,
        };
        let breaker = CircuitBreaker::new();
        breaker.cancel();
        let mut counter = Counter::new();
        let err = cursor.calculate_size(&breaker, &mut counter).unwrap_err();
        assert!(matches!(err, CursorError::Cancelled));
    }
}
