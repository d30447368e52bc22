//! Cooperative cancellation for long-running operator phases.
//!
//! Operators poll [`CircuitBreaker::checkpoint`] at their own poll points; a
//! tripped breaker surfaces as [`ColqError::QueryCancelled`] or
//! [`ColqError::QueryTimeout`]. Nothing here preempts a running operator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use colq_error::{ColqError, Result};

/// Cancellation signal polled by operators.
pub trait CircuitBreaker: Send + Sync {
    /// Returns an error once the query must stop.
    fn checkpoint(&self) -> Result<()>;

    fn is_tripped(&self) -> bool {
        self.checkpoint().is_err()
    }
}

/// Breaker that never trips.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCircuitBreaker;

impl CircuitBreaker for NoopCircuitBreaker {
    fn checkpoint(&self) -> Result<()> {
        Ok(())
    }
}

/// Breaker driven by an external cancel flag and an optional deadline.
#[derive(Debug, Clone)]
pub struct QueryCircuitBreaker {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl QueryCircuitBreaker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Breaker that also trips once `timeout` has elapsed from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Handle that can cancel this breaker from another thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl Default for QueryCircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker for QueryCircuitBreaker {
    fn checkpoint(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(ColqError::QueryCancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ColqError::QueryTimeout);
        }
        Ok(())
    }
}

/// Cancels the [`QueryCircuitBreaker`] it was taken from.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!("query cancellation requested");
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
