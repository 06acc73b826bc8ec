//! SqlEntryStorage: `Storage` for one role in one world, backed by SQL.
//!
//! Names resolve to entry ids lazily: the first read or write that mentions
//! a name creates the entry. Ids are memoized per store until `reload`.
//!
//! Creating, deleting, and memoizing an id all run under that name's map
//! lock, taken after the pooled connection, so a delete can never leave a
//! stale id behind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexSet;
use permstore_core::errors::StorageResult;
use permstore_core::traits::Storage;
use permstore_core::types::{DataValue, EntryType, GroupWorld};
use rusqlite::{params, Connection, OptionalExtension};

use super::backend::BackendShared;
use crate::queries::entries::{self, ENTRY_REF_SQL};
use crate::queries::inheritance::{self, INSERT_PARENT_SQL};
use crate::queries::worlds::WORLD_NAME_SQL;
use crate::queries::{data, permissions, sql_err, with_immediate_transaction};

pub struct SqlEntryStorage {
    shared: Arc<BackendShared>,
    world: String,
    world_id: i64,
    entry_type: EntryType,
    ids: DashMap<String, i64>,
}

impl SqlEntryStorage {
    pub(crate) fn open(
        shared: Arc<BackendShared>,
        world: &str,
        entry_type: EntryType,
    ) -> StorageResult<Self> {
        let world_id = shared.with_conn(|conn| shared.world_id(conn, world))?;
        tracing::debug!(world, kind = entry_type.name(), "opened sql store");
        Ok(Self {
            shared,
            world: world.to_string(),
            world_id,
            entry_type,
            ids: DashMap::new(),
        })
    }

    pub(crate) fn shared(&self) -> &BackendShared {
        &self.shared
    }

    pub(crate) fn world_id(&self) -> i64 {
        self.world_id
    }

    /// Id of `name`, creating the entry on first reference.
    pub(crate) fn entry_id(&self, conn: &Connection, name: &str) -> StorageResult<i64> {
        if let Some(id) = self.ids.get(name).map(|id| *id) {
            return Ok(id);
        }
        match self.ids.entry(name.to_string()) {
            Entry::Occupied(known) => Ok(*known.get()),
            Entry::Vacant(slot) => {
                let (id, _) = entries::ensure_entry(conn, self.world_id, self.entry_type, name)?;
                slot.insert(id);
                Ok(id)
            }
        }
    }

    /// Id of a group anywhere, creating it (and its world) if needed.
    pub(crate) fn group_id(&self, conn: &Connection, world: &str, group: &str) -> StorageResult<i64> {
        if self.entry_type == EntryType::Group && world == self.world {
            return self.entry_id(conn, group);
        }
        let world_id = self.shared.world_id(conn, world)?;
        entries::ensure_entry(conn, world_id, EntryType::Group, group).map(|(id, _)| id)
    }

    /// Id of a group if it exists. Never creates anything.
    fn find_group_id(&self, conn: &Connection, world: &str, group: &str) -> StorageResult<Option<i64>> {
        if self.entry_type == EntryType::Group && world == self.world {
            if let Some(id) = self.ids.get(group).map(|id| *id) {
                return Ok(Some(id));
            }
        }
        match self.shared.find_world_id(conn, world)? {
            Some(world_id) => entries::find_entry(conn, world_id, EntryType::Group, group),
            None => Ok(None),
        }
    }

    fn with_entry<F, T>(&self, name: &str, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection, i64) -> StorageResult<T>,
    {
        self.shared.with_conn(|conn| {
            let id = self.entry_id(conn, name)?;
            f(conn, id)
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl Storage for SqlEntryStorage {
    fn permissions(&self, name: &str) -> StorageResult<HashSet<String>> {
        self.with_entry(name, permissions::permissions)
    }

    fn add_permission(&self, name: &str, permission: &str) -> StorageResult<()> {
        self.with_entry(name, |conn, id| {
            permissions::add_permission(conn, id, permission)
        })
    }

    fn remove_permission(&self, name: &str, permission: &str) -> StorageResult<()> {
        self.with_entry(name, |conn, id| {
            permissions::remove_permission(conn, id, permission)
        })
    }

    fn parents(&self, name: &str) -> StorageResult<IndexSet<GroupWorld>> {
        self.with_entry(name, |conn, id| {
            let parent_ids = inheritance::parent_ids(conn, id)?;
            if parent_ids.is_empty() {
                return Ok(IndexSet::new());
            }

            let ctx = self
                .shared()
                .query_context(conn, &[ENTRY_REF_SQL, WORLD_NAME_SQL]);
            let mut world_names: HashMap<i64, String> = HashMap::new();
            let mut parents = IndexSet::with_capacity(parent_ids.len());

            for parent_id in parent_ids {
                let entry: Option<(String, i64)> = ctx.with_statement(ENTRY_REF_SQL, |stmt| {
                    stmt.query_row(params![parent_id], |row| Ok((row.get(0)?, row.get(1)?)))
                        .optional()
                        .map_err(sql_err)
                })?;
                // Cascading deletes keep links consistent; skip anything else.
                let Some((group, world_id)) = entry else {
                    continue;
                };

                let world = match world_names.get(&world_id) {
                    Some(world) => world.clone(),
                    None => {
                        let world: String = ctx.with_statement(WORLD_NAME_SQL, |stmt| {
                            stmt.query_row(params![world_id], |row| row.get(0))
                                .map_err(sql_err)
                        })?;
                        world_names.insert(world_id, world.clone());
                        world
                    }
                };
                parents.insert(GroupWorld::new(world, group));
            }

            ctx.retire();
            Ok(parents)
        })
    }

    fn add_parent(&self, name: &str, world: &str, group: &str) -> StorageResult<()> {
        self.with_entry(name, |conn, child| {
            let parent = self.group_id(conn, world, group)?;
            inheritance::append_parent(conn, child, parent)
        })
    }

    fn remove_parent(&self, name: &str, world: &str, group: &str) -> StorageResult<()> {
        self.with_entry(name, |conn, child| {
            match self.find_group_id(conn, world, group)? {
                Some(parent) => inheritance::remove_parent(conn, child, parent),
                None => Ok(()),
            }
        })
    }

    fn set_parents(&self, name: &str, parents: &IndexSet<GroupWorld>) -> StorageResult<()> {
        self.with_entry(name, |conn, child| {
            let mut parent_ids = Vec::with_capacity(parents.len());
            for parent in parents {
                let id = self.group_id(conn, &parent.world, &parent.name)?;
                if id != child {
                    parent_ids.push(id);
                }
            }

            with_immediate_transaction(conn, |conn| {
                inheritance::clear_parents(conn, child)?;
                let ctx = self.shared().query_context(conn, &[INSERT_PARENT_SQL]);
                for (order, parent) in parent_ids.iter().enumerate() {
                    ctx.with_statement(INSERT_PARENT_SQL, |stmt| {
                        stmt.execute(params![child, parent, order as i64 + 1])
                            .map_err(sql_err)
                    })?;
                }
                ctx.retire();
                Ok(())
            })
        })
    }

    fn entries(&self) -> StorageResult<HashSet<String>> {
        let listed = self.shared.with_conn(|conn| {
            entries::list_entries(conn, self.world_id, self.entry_type)
        })?;
        Ok(listed.into_iter().map(|(name, _)| name).collect())
    }

    fn create(&self, name: &str) -> StorageResult<bool> {
        self.shared.with_conn(|conn| match self.ids.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                let (id, created) = entries::ensure_entry(conn, self.world_id, self.entry_type, name)?;
                slot.insert(id);
                Ok(created)
            }
        })
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        self.shared.with_conn(|conn| {
            let slot = self.ids.entry(name.to_string());
            let id = match &slot {
                Entry::Occupied(known) => Some(*known.get()),
                Entry::Vacant(_) => entries::find_entry(conn, self.world_id, self.entry_type, name)?,
            };
            let deleted = match id {
                Some(id) => entries::delete_entry(conn, self.world_id, id)?,
                None => false,
            };
            // The row is gone; only now may another caller recreate the name.
            if let Entry::Occupied(known) = slot {
                known.remove();
            }
            Ok(deleted)
        })
    }

    fn get_string(&self, name: &str, path: &str) -> StorageResult<Option<String>> {
        self.with_entry(name, |conn, id| data::get_data(conn, id, path))
    }

    fn get_int(&self, name: &str, path: &str) -> StorageResult<Option<i64>> {
        Ok(self
            .get_string(name, path)?
            .and_then(|raw| raw.trim().parse().ok()))
    }

    fn get_double(&self, name: &str, path: &str) -> StorageResult<Option<f64>> {
        Ok(self
            .get_string(name, path)?
            .and_then(|raw| raw.trim().parse().ok()))
    }

    fn get_bool(&self, name: &str, path: &str) -> StorageResult<Option<bool>> {
        Ok(self
            .get_string(name, path)?
            .and_then(|raw| parse_bool(raw.trim())))
    }

    fn set_data(&self, name: &str, path: &str, value: &DataValue) -> StorageResult<()> {
        let text = value.to_string();
        self.with_entry(name, |conn, id| data::set_data(conn, id, path, &text))
    }

    fn remove_data(&self, name: &str, path: &str) -> StorageResult<()> {
        self.with_entry(name, |conn, id| data::remove_data(conn, id, path))
    }

    fn reload(&self) -> StorageResult<()> {
        self.ids.clear();
        Ok(())
    }

    /// Writes go straight to the database; there is nothing to flush.
    fn save(&self) -> StorageResult<()> {
        Ok(())
    }

    fn force_save(&self) -> StorageResult<()> {
        Ok(())
    }

    fn is_auto_save(&self) -> bool {
        true
    }

    fn set_auto_save(&self, auto_save: bool) {
        if !auto_save {
            tracing::debug!(world = %self.world, "sql storage always saves; ignoring auto-save off");
        }
    }

    fn world(&self) -> &str {
        &self.world
    }

    fn entry_type(&self) -> EntryType {
        self.entry_type
    }
}

impl std::fmt::Debug for SqlEntryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlEntryStorage")
            .field("world", &self.world)
            .field("entry_type", &self.entry_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bools_parse_case_insensitively() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }
}
