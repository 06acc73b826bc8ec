//! inheritance queries: ordered parent links.

use permstore_core::errors::StorageError;
use rusqlite::{params, Connection};

use super::sql_err;

/// Insert one link at an explicit position. Used by the pooled statement
/// loop in `set_parents`.
pub const INSERT_PARENT_SQL: &str =
    "INSERT OR IGNORE INTO inheritance (childid, parentid, parentorder) VALUES (?1, ?2, ?3)";

/// Parent ids of `child`, in order.
pub fn parent_ids(conn: &Connection, child: i64) -> Result<Vec<i64>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT parentid FROM inheritance WHERE childid = ?1 ORDER BY parentorder")
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![child], |row| row.get(0))
        .map_err(sql_err)?;
    rows.collect::<Result<_, _>>().map_err(sql_err)
}

/// Append `parent` after the current last parent. Existing links keep
/// their position.
pub fn append_parent(conn: &Connection, child: i64, parent: i64) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO inheritance (childid, parentid, parentorder)
         SELECT ?1, ?2, COALESCE(MAX(parentorder), 0) + 1
         FROM inheritance WHERE childid = ?1",
        params![child, parent],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn remove_parent(conn: &Connection, child: i64, parent: i64) -> Result<(), StorageError> {
    conn.execute(
        "DELETE FROM inheritance WHERE childid = ?1 AND parentid = ?2",
        params![child, parent],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn clear_parents(conn: &Connection, child: i64) -> Result<(), StorageError> {
    conn.execute("DELETE FROM inheritance WHERE childid = ?1", params![child])
        .map_err(sql_err)?;
    Ok(())
}
