//! entry_data queries: path/value metadata stored as text.

use permstore_core::errors::StorageError;
use rusqlite::{params, Connection, OptionalExtension};

use super::sql_err;

pub fn get_data(conn: &Connection, entry_id: i64, path: &str) -> Result<Option<String>, StorageError> {
    conn.prepare_cached("SELECT data FROM entry_data WHERE entryid = ?1 AND path = ?2")
        .map_err(sql_err)?
        .query_row(params![entry_id, path], |row| row.get(0))
        .optional()
        .map_err(sql_err)
}

pub fn set_data(conn: &Connection, entry_id: i64, path: &str, data: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO entry_data (entryid, path, data) VALUES (?1, ?2, ?3)
         ON CONFLICT (entryid, path) DO UPDATE SET data = excluded.data",
        params![entry_id, path, data],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn remove_data(conn: &Connection, entry_id: i64, path: &str) -> Result<(), StorageError> {
    conn.execute(
        "DELETE FROM entry_data WHERE entryid = ?1 AND path = ?2",
        params![entry_id, path],
    )
    .map_err(sql_err)?;
    Ok(())
}
