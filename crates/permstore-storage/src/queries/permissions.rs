//! permissions queries.

use std::collections::HashSet;

use permstore_core::errors::StorageError;
use rusqlite::{params, Connection};

use super::sql_err;

pub fn permissions(conn: &Connection, entry_id: i64) -> Result<HashSet<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT permstring FROM permissions WHERE entryid = ?1")
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![entry_id], |row| row.get(0))
        .map_err(sql_err)?;
    rows.collect::<Result<_, _>>().map_err(sql_err)
}

pub fn add_permission(conn: &Connection, entry_id: i64, permission: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO permissions (entryid, permstring) VALUES (?1, ?2)",
        params![entry_id, permission],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn remove_permission(
    conn: &Connection,
    entry_id: i64,
    permission: &str,
) -> Result<(), StorageError> {
    conn.execute(
        "DELETE FROM permissions WHERE entryid = ?1 AND permstring = ?2",
        params![entry_id, permission],
    )
    .map_err(sql_err)?;
    Ok(())
}
