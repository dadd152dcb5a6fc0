//! # Execution Module
//!
//! Per-execution context handed to cursor factories, and the circuit
//! breaker that surfaces query cancellation into iteration paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cursor::CursorError;

/// Cancellation handle shared between the query executor and cursors.
///
/// Clones observe the same underlying flag. Cursors are expected to call
/// [`check`](CircuitBreaker::check) at row granularity inside unbounded
/// loops; the join operator itself does not poll per output row, the
/// surrounding executor does.
#[derive(Clone, Debug, Default)]
pub struct CircuitBreaker {
    cancelled: Arc<AtomicBool>,
}

impl CircuitBreaker {
    /// Creates an untripped breaker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the breaker. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the breaker has tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fail fast when the breaker has tripped.
    ///
    /// # Errors
    ///
    /// [`CursorError::Cancelled`] once [`cancel`](CircuitBreaker::cancel)
    /// has been called.
    pub fn check(&self) -> Result<(), CursorError> {
        if self.is_cancelled() {
            Err(CursorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Mutable execution-scoped state passed down the factory tree while
/// cursors are acquired.
#[derive(Debug)]
pub struct ExecutionContext {
    circuit_breaker: CircuitBreaker,
    column_pre_touch_enabled: bool,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreaker::new(),
            column_pre_touch_enabled: true,
        }
    }
}

impl ExecutionContext {
    /// Creates a context with a fresh circuit breaker and column pre-touch
    /// enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context sharing an existing circuit breaker.
    #[must_use]
    pub fn with_circuit_breaker(circuit_breaker: CircuitBreaker) -> Self {
        Self {
            circuit_breaker,
            column_pre_touch_enabled: true,
        }
    }

    /// The cancellation handle for this execution.
    #[must_use]
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Whether page-frame column pre-touch is enabled for this execution.
    #[must_use]
    pub fn column_pre_touch_enabled(&self) -> bool {
        self.column_pre_touch_enabled
    }

    /// Enable or disable column pre-touch. Operators whose access pattern
    /// defeats sequential prefetch turn it off during cursor acquisition.
    pub fn set_column_pre_touch_enabled(&mut self, enabled: bool) {
        self.column_pre_touch_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_starts_untripped() {
        let breaker = CircuitBreaker::new();
        assert!(!breaker.is_cancelled());
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn test_breaker_clones_share_state() {
        let breaker = CircuitBreaker::new();
        let clone = breaker.clone();
        breaker.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(CursorError::Cancelled)));
    }

    #[test]
    fn test_context_pre_touch_defaults_on() {
        let mut ctx = ExecutionContext::new();
        assert!(ctx.column_pre_touch_enabled());
        ctx.set_column_pre_touch_enabled(false);
        assert!(!ctx.column_pre_touch_enabled());
    }
}
