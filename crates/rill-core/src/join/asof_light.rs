//! Light ASOF join cursor and factory.
//!
//! The light variant keeps only a row id per join key: while the master
//! stream drives iteration, the slave stream is pulled forward lazily and a
//! byte-keyed map remembers, per key, the id of the most recent slave row
//! whose timestamp did not exceed the master's. Output re-reads the matched
//! slave row through the slave cursor's probe slot, so no slave record is
//! ever copied into the index.
//!
//! Matched rows honor the optional tolerance interval twice: once when a
//! slave row is inserted into the map (rows below `master_ts - tolerance`
//! are skipped) and once more at probe time, because an id inserted under an
//! earlier master timestamp may have aged out of the window since. Entries
//! are never evicted; with ids-only values an eviction sweep would have to
//! dereference every id back to a record just to read its timestamp, so the
//! map simply grows with the number of distinct slave keys seen.

use std::sync::Arc;

use arrow_schema::DataType;

use crate::cursor::{
    Counter, CursorError, RecordCursor, RecordCursorFactory, RecordMetadata, ScanDirection,
    NULL_ROW_ID,
};
use crate::exec::{CircuitBreaker, ExecutionContext};
use crate::join::outer_record::{NullRecord, OuterJoinRecord};
use crate::join::{JoinConfigError, JoinContext};
use crate::map::{ColumnKeySerializer, JoinKeyMap, KeySerializer};
use crate::plan::PlanSink;

/// Value slots per map entry. Slot 0 holds the slave row id; slot 1 exists
/// so the map layout matches the full join variant's record-chain encoding
/// and is never written here.
const VALUE_LONGS: usize = 2;

/// Counters tracking one execution of the join cursor.
#[derive(Clone, Copy, Debug, Default)]
pub struct AsofJoinMetrics {
    /// Master rows emitted.
    pub rows: u64,
    /// Rows emitted with a matching slave row.
    pub matched: u64,
    /// Rows emitted with a null-shaped slave side.
    pub unmatched: u64,
    /// Slave rows inserted into the key map (replays included).
    pub slave_rows_indexed: u64,
}

impl AsofJoinMetrics {
    /// Reset all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Builds and owns the light ASOF join cursor.
///
/// The factory allocates the join key map once, derives the joined output
/// metadata and the null-shaped slave record from its children, and on each
/// execution acquires fresh source cursors and binds them to the cursor.
pub struct AsofJoinLightCursorFactory {
    metadata: RecordMetadata,
    master_factory: Box<dyn RecordCursorFactory>,
    slave_factory: Box<dyn RecordCursorFactory>,
    join_context: JoinContext,
    tolerance: Option<i64>,
    cursor: AsofLightJoinCursor,
}

impl std::fmt::Debug for AsofJoinLightCursorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsofJoinLightCursorFactory")
            .field("metadata", &self.metadata)
            .field("join_context", &self.join_context)
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl AsofJoinLightCursorFactory {
    /// Creates the factory from explicit key serializers.
    ///
    /// `key_types` declares the map's key column types; `tolerance` bounds
    /// `master_ts - slave_ts` for a match (`None` leaves it unbounded).
    ///
    /// # Errors
    ///
    /// [`JoinConfigError`] when either source lacks a designated timestamp
    /// column.
    pub fn new(
        master_factory: Box<dyn RecordCursorFactory>,
        slave_factory: Box<dyn RecordCursorFactory>,
        master_key_serializer: Box<dyn KeySerializer>,
        slave_key_serializer: Box<dyn KeySerializer>,
        key_types: Vec<DataType>,
        join_context: JoinContext,
        tolerance: Option<i64>,
    ) -> Result<Self, JoinConfigError> {
        let master_timestamp_index = master_factory
            .metadata()
            .timestamp_index()
            .ok_or(JoinConfigError::MasterTimestampMissing)?;
        let slave_timestamp_index = slave_factory
            .metadata()
            .timestamp_index()
            .ok_or(JoinConfigError::SlaveTimestampMissing)?;

        let metadata = RecordMetadata::joined(master_factory.metadata(), slave_factory.metadata());
        let column_split = master_factory.metadata().column_count();
        let null_record = NullRecord::new(Arc::clone(slave_factory.metadata().schema()));

        let mut join_key_map = JoinKeyMap::new(key_types, VALUE_LONGS);
        join_key_map.close();

        let cursor = AsofLightJoinCursor {
            column_split,
            master_timestamp_index,
            slave_timestamp_index,
            tolerance,
            master_key_serializer,
            slave_key_serializer,
            join_key_map,
            null_record,
            master: None,
            slave: None,
            state: JoinState::new(),
            metrics: AsofJoinMetrics::default(),
            is_open: false,
        };

        Ok(Self {
            metadata,
            master_factory,
            slave_factory,
            join_context,
            tolerance,
            cursor,
        })
    }

    /// Creates the factory from `(master column, slave column)` key index
    /// pairs, deriving the serializers, key types, and join context from the
    /// child metadata.
    ///
    /// # Errors
    ///
    /// [`JoinConfigError`] when an index is out of range, the paired columns
    /// disagree in type, or either source lacks a designated timestamp.
    pub fn from_key_columns(
        master_factory: Box<dyn RecordCursorFactory>,
        slave_factory: Box<dyn RecordCursorFactory>,
        key_columns: &[(usize, usize)],
        tolerance: Option<i64>,
    ) -> Result<Self, JoinConfigError> {
        let master_schema = Arc::clone(master_factory.metadata().schema());
        let slave_schema = Arc::clone(slave_factory.metadata().schema());

        let mut master_cols = Vec::with_capacity(key_columns.len());
        let mut slave_cols = Vec::with_capacity(key_columns.len());
        let mut key_types = Vec::with_capacity(key_columns.len());
        let mut pairs = Vec::with_capacity(key_columns.len());
        for &(m, s) in key_columns {
            let master_field = master_schema
                .fields()
                .get(m)
                .ok_or(JoinConfigError::KeyColumnOutOfRange {
                    side: "master",
                    index: m,
                })?;
            let slave_field = slave_schema
                .fields()
                .get(s)
                .ok_or(JoinConfigError::KeyColumnOutOfRange {
                    side: "slave",
                    index: s,
                })?;
            if master_field.data_type() != slave_field.data_type() {
                return Err(JoinConfigError::KeyTypeMismatch {
                    master_column: master_field.name().clone(),
                    master_type: master_field.data_type().clone(),
                    slave_type: slave_field.data_type().clone(),
                });
            }
            master_cols.push((m, master_field.data_type().clone()));
            slave_cols.push((s, slave_field.data_type().clone()));
            key_types.push(master_field.data_type().clone());
            pairs.push((master_field.name().clone(), slave_field.name().clone()));
        }

        Self::new(
            master_factory,
            slave_factory,
            Box::new(ColumnKeySerializer::new(master_cols)),
            Box::new(ColumnKeySerializer::new(slave_cols)),
            key_types,
            JoinContext::new(pairs),
            tolerance,
        )
    }

    /// Metadata of the joined output rows.
    #[must_use]
    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    /// The join cursor is one-shot forward; joined rows have no stable ids.
    #[must_use]
    pub fn supports_random_access(&self) -> bool {
        false
    }

    /// Output order is the master's order.
    #[must_use]
    pub fn followed_order_by_advice(&self) -> bool {
        self.master_factory.followed_order_by_advice()
    }

    /// Scan direction of the driving master source.
    #[must_use]
    pub fn scan_direction(&self) -> ScanDirection {
        self.master_factory.scan_direction()
    }

    /// Acquire source cursors and bind the join cursor for one execution.
    ///
    /// If slave acquisition fails the already-acquired master cursor is
    /// dropped before the error propagates.
    ///
    /// # Errors
    ///
    /// Propagates source acquisition failures.
    pub fn cursor(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> Result<&mut AsofLightJoinCursor, CursorError> {
        // The probe phase random-reads into slave storage, which defeats
        // sequential pre-touch assumptions.
        ctx.set_column_pre_touch_enabled(false);
        let master = self.master_factory.cursor(ctx)?;
        let slave = self.slave_factory.cursor(ctx)?;
        tracing::debug!(tolerance = ?self.tolerance, "binding asof join light cursor");
        self.cursor.bind(master, slave);
        Ok(&mut self.cursor)
    }

    /// Describe this operator and its children to a plan sink.
    pub fn to_plan(&self, sink: &mut PlanSink) {
        sink.node("AsOf Join Light");
        sink.attr("condition", &self.join_context);
        sink.child(self.master_factory.as_ref());
        sink.child(self.slave_factory.as_ref());
    }
}

/// Transient iteration state, reset by `bind` and `rewind`.
#[derive(Debug)]
struct JoinState {
    /// Timestamp of the dangling slave row, `i64::MIN` before any was seen.
    slave_timestamp: i64,
    /// Row id of the dangling slave row, [`NULL_ROW_ID`] when none.
    last_slave_row_id: i64,
    /// Cached master advance result, valid while `master_has_next_pending`
    /// is false.
    master_has_next: bool,
    master_has_next_pending: bool,
    /// Whether the current output row carries a real slave row.
    has_slave: bool,
}

impl JoinState {
    fn new() -> Self {
        Self {
            slave_timestamp: i64::MIN,
            last_slave_row_id: NULL_ROW_ID,
            master_has_next: false,
            master_has_next_pending: true,
            has_slave: false,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// The light ASOF join cursor.
///
/// One output row per master row, in master order. See the module docs for
/// the matching rules; see [`AsofJoinLightCursorFactory::cursor`] for how an
/// execution is started.
pub struct AsofLightJoinCursor {
    column_split: usize,
    master_timestamp_index: usize,
    slave_timestamp_index: usize,
    tolerance: Option<i64>,
    master_key_serializer: Box<dyn KeySerializer>,
    slave_key_serializer: Box<dyn KeySerializer>,
    join_key_map: JoinKeyMap,
    null_record: NullRecord,
    master: Option<Box<dyn RecordCursor>>,
    slave: Option<Box<dyn RecordCursor>>,
    state: JoinState,
    metrics: AsofJoinMetrics,
    is_open: bool,
}

impl AsofLightJoinCursor {
    /// Step to the next joined row. Returns `false` once the master stream
    /// is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates source iteration and random-read failures.
    ///
    /// # Panics
    ///
    /// Panics when called on a cursor that was never bound.
    pub fn advance(&mut self) -> Result<bool, CursorError> {
        let master = self.master.as_mut().expect("cursor is not bound");

        if self.state.master_has_next_pending {
            self.state.master_has_next = master.advance()?;
            self.state.master_has_next_pending = false;
        }
        if !self.state.master_has_next {
            return Ok(false);
        }

        let master_timestamp = master.record().timestamp(self.master_timestamp_index);
        let min_slave_timestamp = match self.tolerance {
            None => i64::MIN,
            Some(tolerance) => master_timestamp.saturating_sub(tolerance),
        };

        let mut slave_timestamp = self.state.slave_timestamp;
        let mut slave_row_id = self.state.last_slave_row_id;
        if slave_timestamp <= master_timestamp {
            let slave = self.slave.as_mut().expect("cursor is not bound");

            // Replay the dangling row first: it overshot the previous master
            // timestamp but may qualify for this one.
            if self.state.last_slave_row_id != NULL_ROW_ID {
                slave.probe_at(self.state.last_slave_row_id)?;
                let probe = slave.probe();
                slave_timestamp = probe.timestamp(self.slave_timestamp_index);
                if slave_timestamp >= min_slave_timestamp {
                    self.join_key_map
                        .with_key(probe, self.slave_key_serializer.as_ref())
                        .create_value()
                        .put_long(0, self.state.last_slave_row_id);
                    self.metrics.slave_rows_indexed += 1;
                }
            }

            // The map is not evacuated when keys age out of the tolerance
            // window; values are bare row ids, so the probe below re-checks
            // the window instead.
            while slave.advance()? {
                let row = slave.record();
                slave_timestamp = row.timestamp(self.slave_timestamp_index);
                slave_row_id = row.row_id();
                if slave_timestamp > master_timestamp {
                    break;
                }
                if slave_timestamp >= min_slave_timestamp {
                    self.join_key_map
                        .with_key(row, self.slave_key_serializer.as_ref())
                        .create_value()
                        .put_long(0, slave_row_id);
                    self.metrics.slave_rows_indexed += 1;
                }
            }

            // Hold on to the dangling slave row for the next master row.
            self.state.slave_timestamp = slave_timestamp;
            self.state.last_slave_row_id = slave_row_id;
        }

        let matched_row_id = self
            .join_key_map
            .with_key(master.record(), self.master_key_serializer.as_ref())
            .find_value()
            .map(|value| value.long(0));
        match matched_row_id {
            Some(row_id) => {
                let slave = self.slave.as_mut().expect("cursor is not bound");
                slave.probe_at(row_id)?;
                let probed_timestamp = slave.probe().timestamp(self.slave_timestamp_index);
                // The stored id may predate the current window.
                self.state.has_slave = match self.tolerance {
                    None => true,
                    Some(tolerance) => {
                        probed_timestamp >= master_timestamp.saturating_sub(tolerance)
                    }
                };
            }
            None => self.state.has_slave = false,
        }

        self.metrics.rows += 1;
        if self.state.has_slave {
            self.metrics.matched += 1;
        } else {
            self.metrics.unmatched += 1;
        }

        self.state.master_has_next_pending = true;
        Ok(true)
    }

    /// The current joined row. Valid after `advance` returned `true`.
    ///
    /// # Panics
    ///
    /// Panics when called on a cursor that was never bound.
    #[must_use]
    pub fn record(&self) -> OuterJoinRecord<'_> {
        let master = self.master.as_ref().expect("cursor is not bound").record();
        let slave = self.slave.as_ref().expect("cursor is not bound").probe();
        OuterJoinRecord::new(
            master,
            slave,
            &self.null_record,
            self.column_split,
            self.state.has_slave,
        )
    }

    /// Restart iteration: empty the key map, forget the dangling row, and
    /// rewind both sources.
    pub fn rewind(&mut self) {
        self.join_key_map.clear();
        self.state.reset();
        self.metrics.reset();
        if let Some(master) = self.master.as_mut() {
            master.rewind();
        }
        if let Some(slave) = self.slave.as_mut() {
            slave.rewind();
        }
    }

    /// Output row count: one row per master row.
    #[must_use]
    pub fn size(&self) -> i64 {
        self.master.as_ref().map_or(-1, |master| master.size())
    }

    /// Pre-computed state of both sources, passed through.
    #[must_use]
    pub fn pre_computed_state_size(&self) -> i64 {
        let master = self
            .master
            .as_ref()
            .map_or(0, |cursor| cursor.pre_computed_state_size());
        let slave = self
            .slave
            .as_ref()
            .map_or(0, |cursor| cursor.pre_computed_state_size());
        master + slave
    }

    /// Delegate size calculation to the master source under the breaker.
    ///
    /// # Errors
    ///
    /// [`CursorError::Cancelled`] when the breaker trips; master iteration
    /// failures propagate.
    pub fn calculate_size(
        &mut self,
        breaker: &CircuitBreaker,
        counter: &mut Counter,
    ) -> Result<(), CursorError> {
        match self.master.as_mut() {
            Some(master) => master.calculate_size(breaker, counter),
            None => Ok(()),
        }
    }

    /// Counters for the current execution.
    #[must_use]
    pub fn metrics(&self) -> &AsofJoinMetrics {
        &self.metrics
    }

    /// Close the key map and drop both source cursors. Idempotent; the
    /// factory's next bind reopens the map.
    pub fn release(&mut self) {
        if self.is_open {
            self.is_open = false;
            self.join_key_map.close();
            self.master = None;
            self.slave = None;
        }
    }

    fn bind(&mut self, master: Box<dyn RecordCursor>, slave: Box<dyn RecordCursor>) {
        if !self.is_open {
            self.is_open = true;
            self.join_key_map.reopen();
        }
        self.state.reset();
        self.metrics.reset();
        self.master = Some(master);
        self.slave = Some(slave);
    }
}

impl Drop for AsofLightJoinCursor {
    fn drop(&mut self) {
        self.release();
    }
}
