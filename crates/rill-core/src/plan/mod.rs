//! # Plan Module
//!
//! Text rendering of cursor-factory trees. Factories describe themselves
//! through [`PlanSink`]: an operator node line, optional attributes, then
//! child factories one indent level deeper.

use std::fmt::{Display, Write as _};

use crate::cursor::RecordCursorFactory;

const NODE_INDENT: usize = 4;
const ATTR_INDENT: usize = 2;

/// Accumulates an indented, human-readable execution plan.
#[derive(Debug, Default)]
pub struct PlanSink {
    out: String,
    depth: usize,
}

impl PlanSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an operator node line at the current depth.
    pub fn node(&mut self, name: &str) {
        let indent = self.depth * NODE_INDENT;
        let _ = writeln!(self.out, "{:indent$}{name}", "");
    }

    /// Emit an attribute line under the current node.
    pub fn attr(&mut self, name: &str, value: &dyn Display) {
        let indent = self.depth * NODE_INDENT + ATTR_INDENT;
        let _ = writeln!(self.out, "{:indent$}{name}: {value}", "");
    }

    /// Render a child factory one level deeper.
    pub fn child(&mut self, factory: &dyn RecordCursorFactory) {
        self.depth += 1;
        factory.to_plan(self);
        self.depth -= 1;
    }

    /// The rendered plan text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.out
    }
}
