//! world_defaults and tracks queries.

use permstore_core::errors::StorageError;
use permstore_core::types::GroupWorld;
use rusqlite::{params, Connection, OptionalExtension};

use super::sql_err;

/// Name of the world's default group.
pub fn default_group(conn: &Connection, world_id: i64) -> Result<Option<String>, StorageError> {
    conn.prepare_cached(
        "SELECT e.name FROM world_defaults d
         JOIN entries e ON e.entryid = d.defaultid
         WHERE d.worldid = ?1",
    )
    .map_err(sql_err)?
    .query_row(params![world_id], |row| row.get(0))
    .optional()
    .map_err(sql_err)
}

pub fn set_default_group(conn: &Connection, world_id: i64, group_id: i64) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO world_defaults (worldid, defaultid) VALUES (?1, ?2)
         ON CONFLICT (worldid) DO UPDATE SET defaultid = excluded.defaultid",
        params![world_id, group_id],
    )
    .map_err(sql_err)?;
    Ok(())
}

/// Track names of a world, oldest first.
pub fn track_names(conn: &Connection, world_id: i64) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT trackname FROM tracks WHERE worldid = ?1 ORDER BY trackid")
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![world_id], |row| row.get(0))
        .map_err(sql_err)?;
    rows.collect::<Result<_, _>>().map_err(sql_err)
}

/// Ordered members of a track. Members may be groups of other worlds.
pub fn track_members(
    conn: &Connection,
    world_id: i64,
    track: &str,
) -> Result<Vec<GroupWorld>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT w.worldname, e.name
             FROM tracks t
             JOIN track_groups tg ON tg.trackid = t.trackid
             JOIN entries e ON e.entryid = tg.gid
             JOIN worlds w ON w.worldid = e.worldid
             WHERE t.worldid = ?1 AND t.trackname = ?2
             ORDER BY tg.grouporder",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![world_id, track], |row| {
            Ok(GroupWorld::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(sql_err)?;
    rows.collect::<Result<_, _>>().map_err(sql_err)
}

/// Replace the membership of `track`, creating the track if needed. Run it
/// inside a transaction.
pub fn replace_track(
    conn: &Connection,
    world_id: i64,
    track: &str,
    group_ids: &[i64],
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO tracks (trackname, worldid) VALUES (?1, ?2)",
        params![track, world_id],
    )
    .map_err(sql_err)?;
    let track_id: i64 = conn
        .query_row(
            "SELECT trackid FROM tracks WHERE trackname = ?1 AND worldid = ?2",
            params![track, world_id],
            |row| row.get(0),
        )
        .map_err(sql_err)?;

    conn.execute("DELETE FROM track_groups WHERE trackid = ?1", params![track_id])
        .map_err(sql_err)?;
    let mut insert = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO track_groups (trackid, gid, grouporder) VALUES (?1, ?2, ?3)",
        )
        .map_err(sql_err)?;
    for (order, gid) in group_ids.iter().enumerate() {
        insert
            .execute(params![track_id, gid, order as i64 + 1])
            .map_err(sql_err)?;
    }
    Ok(())
}
