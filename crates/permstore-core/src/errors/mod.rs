//! Error handling for permstore.
//! One error enum per subsystem, `thiserror` only.

pub mod config_error;
pub mod error_code;
pub mod pool_error;
pub mod statement_error;
pub mod storage_error;

pub use config_error::ConfigError;
pub use error_code::PermstoreErrorCode;
pub use pool_error::PoolError;
pub use statement_error::StatementError;
pub use storage_error::{StorageError, StorageResult};
