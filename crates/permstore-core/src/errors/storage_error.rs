//! Storage-layer errors.

use super::error_code::{self, PermstoreErrorCode};
use super::{PoolError, StatementError};

/// Errors returned by every `Storage` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Statement error: {0}")]
    Statement(#[from] StatementError),

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: u32, reason: String },

    /// A cached storage may not wrap another cached storage.
    #[error("cached storage cannot wrap another cached storage")]
    NestedCache,

    #[error("unknown {kind} `{name}`")]
    UnknownEntry { kind: &'static str, name: String },

    #[error("{what} lock poisoned")]
    Lock { what: &'static str },
}

impl PermstoreErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Pool(e) => e.error_code(),
            Self::Statement(e) => e.error_code(),
            Self::NestedCache => error_code::CONFIG_ERROR,
            Self::Lock { .. } => error_code::LOCK_POISONED,
            _ => error_code::STORAGE_ERROR,
        }
    }
}

/// Shorthand for storage results.
pub type StorageResult<T> = Result<T, StorageError>;
