//! Query functions: plain `&Connection` in, typed results out.

pub mod data;
pub mod entries;
pub mod inheritance;
pub mod permissions;
pub mod tracks;
pub mod worlds;

use permstore_core::errors::StorageError;
use rusqlite::Connection;

pub(crate) fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::Sqlite {
        message: e.to_string(),
    }
}

/// Run `f` inside a BEGIN IMMEDIATE transaction, taking the write lock up
/// front. Commits on `Ok`, rolls back on `Err`.
pub fn with_immediate_transaction<F, T>(conn: &Connection, f: F) -> Result<T, StorageError>
where
    F: FnOnce(&Connection) -> Result<T, StorageError>,
{
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| StorageError::Sqlite {
            message: format!("failed to begin immediate transaction: {e}"),
        })?;

    let result = f(conn).and_then(|value| {
        conn.execute_batch("COMMIT")
            .map(|()| value)
            .map_err(|e| StorageError::Sqlite {
                message: format!("failed to commit: {e}"),
            })
    });

    if result.is_err() && !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
    result
}
