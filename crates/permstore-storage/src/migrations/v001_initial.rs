//! V001: Initial schema.
//! worlds, entries, permissions, inheritance, world_defaults, entry_data,
//! tracks, track_groups.

pub const MIGRATION_SQL: &str = r#"
-- Worlds partition every other table.
CREATE TABLE IF NOT EXISTS worlds (
    worldid INTEGER PRIMARY KEY AUTOINCREMENT,
    worldname TEXT NOT NULL UNIQUE
) STRICT;

-- Users (type 0) and groups (type 1), unique per world and role.
CREATE TABLE IF NOT EXISTS entries (
    entryid INTEGER PRIMARY KEY AUTOINCREMENT,
    worldid INTEGER NOT NULL REFERENCES worlds(worldid) ON DELETE CASCADE,
    type INTEGER NOT NULL CHECK (type IN (0, 1)),
    name TEXT NOT NULL,
    UNIQUE (worldid, type, name)
) STRICT;

CREATE TABLE IF NOT EXISTS permissions (
    entryid INTEGER NOT NULL REFERENCES entries(entryid) ON DELETE CASCADE,
    permstring TEXT NOT NULL,
    PRIMARY KEY (entryid, permstring)
) STRICT;

-- Ordered parent links. A parent may live in another world.
CREATE TABLE IF NOT EXISTS inheritance (
    childid INTEGER NOT NULL REFERENCES entries(entryid) ON DELETE CASCADE,
    parentid INTEGER NOT NULL REFERENCES entries(entryid) ON DELETE CASCADE,
    parentorder INTEGER NOT NULL,
    PRIMARY KEY (childid, parentid),
    UNIQUE (childid, parentorder),
    CHECK (childid <> parentid)
) STRICT;

CREATE INDEX IF NOT EXISTS idx_inheritance_parent
    ON inheritance(parentid);

-- At most one default group per world.
CREATE TABLE IF NOT EXISTS world_defaults (
    worldid INTEGER PRIMARY KEY REFERENCES worlds(worldid) ON DELETE CASCADE,
    defaultid INTEGER NOT NULL REFERENCES entries(entryid) ON DELETE CASCADE
) STRICT;

-- Path/value metadata, values stored as text.
CREATE TABLE IF NOT EXISTS entry_data (
    entryid INTEGER NOT NULL REFERENCES entries(entryid) ON DELETE CASCADE,
    path TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (entryid, path)
) STRICT;

CREATE TABLE IF NOT EXISTS tracks (
    trackid INTEGER PRIMARY KEY AUTOINCREMENT,
    trackname TEXT NOT NULL,
    worldid INTEGER NOT NULL REFERENCES worlds(worldid) ON DELETE CASCADE,
    UNIQUE (trackname, worldid)
) STRICT;

CREATE TABLE IF NOT EXISTS track_groups (
    trackid INTEGER NOT NULL REFERENCES tracks(trackid) ON DELETE CASCADE,
    gid INTEGER NOT NULL REFERENCES entries(entryid) ON DELETE CASCADE,
    grouporder INTEGER NOT NULL,
    PRIMARY KEY (trackid, gid)
) STRICT;

CREATE INDEX IF NOT EXISTS idx_track_groups_order
    ON track_groups(trackid, grouporder);
"#;
