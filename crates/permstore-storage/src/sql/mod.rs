//! SQL-backed storage: the backend, its per-world stores, and the statement
//! contexts they run queries through.

pub mod backend;
pub mod context;
pub mod entry_storage;
pub mod group_storage;

pub use backend::{SqlBackend, SqlitePool};
pub use context::QueryContext;
pub use entry_storage::SqlEntryStorage;
pub use group_storage::SqlGroupStorage;
