//! worlds queries: resolve, create, reverse lookup.

use permstore_core::errors::StorageError;
use rusqlite::{params, Connection, OptionalExtension};

use super::sql_err;

/// Reverse lookup used while resolving parent links.
pub const WORLD_NAME_SQL: &str = "SELECT worldname FROM worlds WHERE worldid = ?1";

pub fn find_world(conn: &Connection, name: &str) -> Result<Option<i64>, StorageError> {
    conn.prepare_cached("SELECT worldid FROM worlds WHERE worldname = ?1")
        .map_err(sql_err)?
        .query_row(params![name], |row| row.get(0))
        .optional()
        .map_err(sql_err)
}

/// Id of world `name`, creating the world if needed.
pub fn ensure_world(conn: &Connection, name: &str) -> Result<i64, StorageError> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO worlds (worldname) VALUES (?1)",
            params![name],
        )
        .map_err(sql_err)?;
    if inserted > 0 {
        tracing::info!(world = name, "created world");
    }
    find_world(conn, name)?.ok_or_else(|| StorageError::UnknownEntry {
        kind: "world",
        name: name.to_string(),
    })
}

pub fn world_name(conn: &Connection, id: i64) -> Result<Option<String>, StorageError> {
    conn.prepare_cached(WORLD_NAME_SQL)
        .map_err(sql_err)?
        .query_row(params![id], |row| row.get(0))
        .optional()
        .map_err(sql_err)
}

pub fn list_worlds(conn: &Connection) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT worldname FROM worlds ORDER BY worldid")
        .map_err(sql_err)?;
    let rows = stmt
        .query_map([], |row| row.get(0))
        .map_err(sql_err)?;
    rows.collect::<Result<_, _>>().map_err(sql_err)
}
