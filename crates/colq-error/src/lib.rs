//! Error type for query execution.
//!
//! Every fallible operation in the executor returns [`Result`]. Cancellation
//! is reported through dedicated variants so callers can tell an aborted
//! query apart from a failed one (see [`ColqError::is_cancellation`]).

use thiserror::Error;

/// Errors raised while building or running operator trees.
#[derive(Debug, Error)]
pub enum ColqError {
    /// The circuit breaker observed a cancellation request.
    #[error("query cancelled")]
    QueryCancelled,

    /// The circuit breaker observed an expired deadline.
    #[error("query timed out")]
    QueryTimeout,

    /// A bounded resource (chain pages, map entries) ran out of room.
    #[error("{resource} limit exceeded [limit={limit}]")]
    LimitExceeded { resource: &'static str, limit: usize },

    /// A value did not match the declared column type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A column index past the end of a record.
    #[error("column index {index} out of range (record has {count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },

    /// Rejected configuration or construction argument.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cursor was used after `close()`.
    #[error("cursor is closed")]
    CursorClosed,

    /// A factory that hands out a single cursor was asked for a second one
    /// while the first is still live.
    #[error("cursor already in use by another execution")]
    CursorInUse,

    /// The factory was used after `close()`.
    #[error("factory is closed")]
    FactoryClosed,

    /// Operation the cursor or factory does not support.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Broken internal assumption inside the executor.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ColqError {
    /// Shorthand for [`ColqError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Shorthand for [`ColqError::InvalidConfig`].
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for errors raised by a tripped circuit breaker.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::QueryCancelled | Self::QueryTimeout)
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, ColqError>;
