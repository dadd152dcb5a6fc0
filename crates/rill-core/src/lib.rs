//! # Rill Core
//!
//! Execution core for the Rill columnar time-series engine. The centerpiece
//! is the streaming ASOF join: for every row of a driving *master* stream it
//! finds, per join key, the most recent *slave* row at or before the master
//! timestamp and emits the two rows side by side, falling back to a
//! null-shaped slave side when no row qualifies.
//!
//! This crate provides:
//! - **Cursors**: pull-based record cursor and factory contracts ([`cursor`])
//! - **Join**: the light ASOF join cursor and its factory ([`join`])
//! - **Key index**: byte-keyed row-id map and key serialization ([`map`])
//! - **Execution**: execution context and circuit breaker ([`exec`])
//! - **Plan**: text rendering of factory trees ([`plan`])
//! - **Tables**: an in-memory Arrow-backed record source ([`table`])
//!
//! ## Design Principles
//!
//! 1. **Lazy slave consumption** - the slave stream is only pulled as far as
//!    master timestamps demand
//! 2. **Row ids, not rows** - the join index stores an 8-byte row id per key
//!    and re-reads slave rows through a probe slot on output
//! 3. **Strictly sequential** - one mutator (`advance`), no locks, no
//!    suspension points
//!
//! ## Example
//!
//! ```rust,ignore
//! use rill_core::exec::ExecutionContext;
//! use rill_core::join::AsofJoinLightCursorFactory;
//!
//! let mut factory = AsofJoinLightCursorFactory::from_key_columns(
//!     trades, quotes, &[(1, 1)], Some(5_000),
//! )?;
//! let mut ctx = ExecutionContext::new();
//! let cursor = factory.cursor(&mut ctx)?;
//! while cursor.advance()? {
//!     let row = cursor.record();
//!     // project `row`
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cursor;
pub mod exec;
pub mod join;
pub mod map;
pub mod plan;
pub mod table;

// Re-export the operator entry points.
pub use join::{AsofJoinLightCursorFactory, AsofLightJoinCursor};

/// Result type for rill-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for rill-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Cursor acquisition or iteration errors
    #[error("Cursor error: {0}")]
    Cursor(#[from] cursor::CursorError),

    /// Join operator construction errors
    #[error("Join configuration error: {0}")]
    JoinConfig(#[from] join::JoinConfigError),
}
