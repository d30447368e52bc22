//! Per-execution context handed to `get_cursor`.

use std::fmt;
use std::sync::Arc;

use colq_types::{CircuitBreaker, NoopCircuitBreaker};

/// State shared by every cursor of one query execution.
#[derive(Clone)]
pub struct ExecutionContext {
    circuit_breaker: Arc<dyn CircuitBreaker>,
}

impl ExecutionContext {
    pub fn new(circuit_breaker: Arc<dyn CircuitBreaker>) -> Self {
        Self { circuit_breaker }
    }

    #[must_use]
    pub fn circuit_breaker(&self) -> Arc<dyn CircuitBreaker> {
        Arc::clone(&self.circuit_breaker)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Arc::new(NoopCircuitBreaker))
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("circuit_breaker_tripped", &self.circuit_breaker.is_tripped())
            .finish()
    }
}
