//! Stable error codes shared by every subsystem error.

pub const POOL_UNAVAILABLE: &str = "POOL_UNAVAILABLE";
pub const POOL_CONNECT_FAILED: &str = "POOL_CONNECT_FAILED";
pub const POOL_RESOURCE_GONE: &str = "POOL_RESOURCE_GONE";
pub const TASK_SPAWN_FAILED: &str = "TASK_SPAWN_FAILED";
pub const STATEMENT_ERROR: &str = "STATEMENT_ERROR";
pub const STATEMENT_POOL_CLOSED: &str = "STATEMENT_POOL_CLOSED";
pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
pub const LOCK_POISONED: &str = "LOCK_POISONED";

/// Maps an error to a stable, machine-readable code.
pub trait PermstoreErrorCode {
    fn error_code(&self) -> &'static str;
}
