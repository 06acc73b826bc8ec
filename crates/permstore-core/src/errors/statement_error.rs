//! Statement pool errors.

use super::error_code::{self, PermstoreErrorCode};

/// Errors surfaced by statement pools and their handles.
#[derive(Debug, thiserror::Error)]
pub enum StatementError {
    #[error("failed to prepare `{sql}`: {message}")]
    PrepareFailed { sql: String, message: String },

    /// The handle was already closed; its query went back to the pool.
    #[error("statement handle already closed")]
    HandleClosed,

    /// The owning pool was closed; no further checkouts.
    #[error("statement pool for `{sql}` is closed")]
    PoolClosed { sql: String },
}

impl PermstoreErrorCode for StatementError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::PoolClosed { .. } => error_code::STATEMENT_POOL_CLOSED,
            _ => error_code::STATEMENT_ERROR,
        }
    }
}
