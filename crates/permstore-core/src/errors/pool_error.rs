//! Connection pool errors.

use super::error_code::{self, PermstoreErrorCode};

/// Errors surfaced by the connection pool.
///
/// Transient problems (a stale or invalid idle connection) never show up
/// here: the pool destroys the resource and retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool has been shut down; no new leases are granted.
    #[error("connection pool is unavailable (shut down)")]
    Unavailable,

    /// The data source could not produce a new connection.
    #[error("failed to open connection: {message}")]
    ConnectFailed { message: String },

    /// The leased resource no longer holds a live connection.
    #[error("pooled connection has been destroyed")]
    ResourceGone,

    /// The lease was released, or belongs to another thread.
    #[error("connection is not leased to the calling thread")]
    NotLeased,

    #[error("pooled connection lock poisoned")]
    LockPoisoned,

    #[error("failed to start background task `{task}`: {message}")]
    TaskSpawn { task: String, message: String },
}

impl PermstoreErrorCode for PoolError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unavailable => error_code::POOL_UNAVAILABLE,
            Self::ConnectFailed { .. } => error_code::POOL_CONNECT_FAILED,
            Self::ResourceGone | Self::NotLeased => error_code::POOL_RESOURCE_GONE,
            Self::LockPoisoned => error_code::LOCK_POISONED,
            Self::TaskSpawn { .. } => error_code::TASK_SPAWN_FAILED,
        }
    }
}
