//! permstore-storage: pooled, cached SQL persistence for permissions.
//!
//! - Connection pool with lease ownership, validation, and an idle reaper
//! - Statement pools bound to a leased connection
//! - Versioned SQLite schema and query functions
//! - SQL-backed user and group stores behind one backend instance
//! - A write-through caching decorator for any `Storage`

pub mod cache;
pub mod factory;
pub mod migrations;
pub mod pool;
pub mod queries;
pub mod sql;
pub mod statement;
pub mod task;

pub use cache::{CacheGroup, CachedStorage};
pub use factory::StorageFactory;
pub use pool::{ConnectionPool, Lease, PoolStats, SqliteSource};
pub use sql::{SqlBackend, SqlEntryStorage, SqlGroupStorage};
pub use statement::{PooledStatement, StatementPool, StatementSource};
