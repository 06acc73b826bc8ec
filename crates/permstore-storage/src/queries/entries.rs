//! entries queries: users and groups scoped to a world.

use permstore_core::errors::StorageError;
use permstore_core::types::EntryType;
use rusqlite::{params, Connection, OptionalExtension};

use super::sql_err;

/// Name and world of an entry id, used while resolving parent links.
pub const ENTRY_REF_SQL: &str = "SELECT name, worldid FROM entries WHERE entryid = ?1";

pub fn find_entry(
    conn: &Connection,
    world_id: i64,
    entry_type: EntryType,
    name: &str,
) -> Result<Option<i64>, StorageError> {
    conn.prepare_cached(
        "SELECT entryid FROM entries WHERE worldid = ?1 AND type = ?2 AND name = ?3",
    )
    .map_err(sql_err)?
    .query_row(params![world_id, entry_type.as_db_flag(), name], |row| {
        row.get(0)
    })
    .optional()
    .map_err(sql_err)
}

/// Id of the entry, creating it if needed. The flag reports whether this
/// call created it.
pub fn ensure_entry(
    conn: &Connection,
    world_id: i64,
    entry_type: EntryType,
    name: &str,
) -> Result<(i64, bool), StorageError> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO entries (worldid, type, name) VALUES (?1, ?2, ?3)",
            params![world_id, entry_type.as_db_flag(), name],
        )
        .map_err(sql_err)?;
    let id = find_entry(conn, world_id, entry_type, name)?.ok_or_else(|| {
        StorageError::UnknownEntry {
            kind: entry_type.name(),
            name: name.to_string(),
        }
    })?;
    if inserted > 0 {
        tracing::debug!(world_id, kind = entry_type.name(), name, "created entry");
    }
    Ok((id, inserted > 0))
}

/// All entries of one role in one world, as (name, id).
pub fn list_entries(
    conn: &Connection,
    world_id: i64,
    entry_type: EntryType,
) -> Result<Vec<(String, i64)>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT name, entryid FROM entries WHERE worldid = ?1 AND type = ?2")
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![world_id, entry_type.as_db_flag()], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .map_err(sql_err)?;
    rows.collect::<Result<_, _>>().map_err(sql_err)
}

/// Delete an entry. Its permissions, links, and data cascade.
pub fn delete_entry(conn: &Connection, world_id: i64, entry_id: i64) -> Result<bool, StorageError> {
    let deleted = conn
        .execute(
            "DELETE FROM entries WHERE worldid = ?1 AND entryid = ?2",
            params![world_id, entry_id],
        )
        .map_err(sql_err)?;
    Ok(deleted > 0)
}
