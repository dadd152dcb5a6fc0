//! # Join Module
//!
//! Temporal join operators over record cursors.
//!
//! The light ASOF join ([`asof_light`]) matches each master row with the
//! most recent slave row for the same key at or before the master
//! timestamp, optionally bounded by a tolerance interval, null-extending
//! the slave side when nothing qualifies.

use std::fmt;

use arrow_schema::DataType;

pub mod asof_light;
pub mod outer_record;

pub use asof_light::{AsofJoinLightCursorFactory, AsofJoinMetrics, AsofLightJoinCursor};
pub use outer_record::{NullRecord, OuterJoinRecord};

/// The equi-join predicate of a join operator, kept for plan rendering.
///
/// Pairs are `(master column name, slave column name)`.
#[derive(Clone, Debug)]
pub struct JoinContext {
    pairs: Vec<(String, String)>,
}

impl JoinContext {
    /// Creates a context over master/slave key column name pairs.
    #[must_use]
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// The key column name pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

impl fmt::Display for JoinContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (master, slave)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, " and ")?;
            }
            write!(f, "{master}={slave}")?;
        }
        Ok(())
    }
}

/// Errors raised while constructing a join operator.
#[derive(Debug, thiserror::Error)]
pub enum JoinConfigError {
    /// The master source has no designated timestamp column.
    #[error("master source has no designated timestamp column")]
    MasterTimestampMissing,

    /// The slave source has no designated timestamp column.
    #[error("slave source has no designated timestamp column")]
    SlaveTimestampMissing,

    /// A key column index does not exist on the named side.
    #[error("join key column {index} is out of range for the {side} source")]
    KeyColumnOutOfRange {
        /// `"master"` or `"slave"`.
        side: &'static str,
        /// The offending column index.
        index: usize,
    },

    /// Key columns disagree in type between the two sides.
    #[error("join key type mismatch on {master_column}: {master_type} vs {slave_type}")]
    KeyTypeMismatch {
        /// Master-side column name.
        master_column: String,
        /// Master-side column type.
        master_type: DataType,
        /// Slave-side column type.
        slave_type: DataType,
    },
}
