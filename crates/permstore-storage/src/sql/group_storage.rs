//! SqlGroupStorage: group store with the world's default group and tracks.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use indexmap::IndexSet;
use permstore_core::errors::{StorageError, StorageResult};
use permstore_core::traits::{GroupStorage, Storage};
use permstore_core::types::{DataValue, EntryType, GroupWorld};

use super::backend::BackendShared;
use super::entry_storage::SqlEntryStorage;
use crate::queries::{tracks, with_immediate_transaction};

pub struct SqlGroupStorage {
    inner: SqlEntryStorage,
    /// Outer `None`: not loaded yet.
    default_group: RwLock<Option<Option<String>>>,
}

impl SqlGroupStorage {
    pub(crate) fn open(shared: Arc<BackendShared>, world: &str) -> StorageResult<Self> {
        Ok(Self {
            inner: SqlEntryStorage::open(shared, world, EntryType::Group)?,
            default_group: RwLock::new(None),
        })
    }

    fn lock_error(_: impl std::fmt::Debug) -> StorageError {
        StorageError::Lock {
            what: "default group",
        }
    }

    fn forget_default(&self) -> StorageResult<()> {
        *self.default_group.write().map_err(Self::lock_error)? = None;
        Ok(())
    }

    /// The world's default group, if one is set.
    pub fn default_group(&self) -> StorageResult<Option<String>> {
        if let Some(memo) = self
            .default_group
            .read()
            .map_err(Self::lock_error)?
            .as_ref()
        {
            return Ok(memo.clone());
        }

        let loaded = self
            .inner
            .shared()
            .with_conn(|conn| tracks::default_group(conn, self.inner.world_id()))?;
        *self.default_group.write().map_err(Self::lock_error)? = Some(loaded.clone());
        Ok(loaded)
    }

    /// Make `name` the world's default group, creating the group if needed.
    pub fn set_default_group(&self, name: &str) -> StorageResult<()> {
        self.inner.shared().with_conn(|conn| {
            let id = self.inner.entry_id(conn, name)?;
            tracks::set_default_group(conn, self.inner.world_id(), id)
        })?;
        *self.default_group.write().map_err(Self::lock_error)? = Some(Some(name.to_string()));
        tracing::info!(world = %self.inner.world(), group = name, "default group set");
        Ok(())
    }

    /// Replace the ordered members of `track`, creating the track and any
    /// missing groups.
    pub fn set_track(&self, track: &str, groups: &[GroupWorld]) -> StorageResult<()> {
        self.inner.shared().with_conn(|conn| {
            let mut ids = Vec::with_capacity(groups.len());
            for group in groups {
                ids.push(self.inner.group_id(conn, &group.world, &group.name)?);
            }
            with_immediate_transaction(conn, |conn| {
                tracks::replace_track(conn, self.inner.world_id(), track, &ids)
            })
        })
    }
}

impl Storage for SqlGroupStorage {
    fn permissions(&self, name: &str) -> StorageResult<HashSet<String>> {
        self.inner.permissions(name)
    }

    fn add_permission(&self, name: &str, permission: &str) -> StorageResult<()> {
        self.inner.add_permission(name, permission)
    }

    fn remove_permission(&self, name: &str, permission: &str) -> StorageResult<()> {
        self.inner.remove_permission(name, permission)
    }

    fn parents(&self, name: &str) -> StorageResult<IndexSet<GroupWorld>> {
        self.inner.parents(name)
    }

    fn add_parent(&self, name: &str, world: &str, group: &str) -> StorageResult<()> {
        self.inner.add_parent(name, world, group)
    }

    fn remove_parent(&self, name: &str, world: &str, group: &str) -> StorageResult<()> {
        self.inner.remove_parent(name, world, group)
    }

    fn set_parents(&self, name: &str, parents: &IndexSet<GroupWorld>) -> StorageResult<()> {
        self.inner.set_parents(name, parents)
    }

    fn entries(&self) -> StorageResult<HashSet<String>> {
        self.inner.entries()
    }

    fn create(&self, name: &str) -> StorageResult<bool> {
        self.inner.create(name)
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        let deleted = self.inner.delete(name)?;
        // The default link cascades with the group.
        if deleted {
            self.forget_default()?;
        }
        Ok(deleted)
    }

    fn get_string(&self, name: &str, path: &str) -> StorageResult<Option<String>> {
        self.inner.get_string(name, path)
    }

    fn get_int(&self, name: &str, path: &str) -> StorageResult<Option<i64>> {
        self.inner.get_int(name, path)
    }

    fn get_double(&self, name: &str, path: &str) -> StorageResult<Option<f64>> {
        self.inner.get_double(name, path)
    }

    fn get_bool(&self, name: &str, path: &str) -> StorageResult<Option<bool>> {
        self.inner.get_bool(name, path)
    }

    fn set_data(&self, name: &str, path: &str, value: &DataValue) -> StorageResult<()> {
        self.inner.set_data(name, path, value)
    }

    fn remove_data(&self, name: &str, path: &str) -> StorageResult<()> {
        self.inner.remove_data(name, path)
    }

    fn reload(&self) -> StorageResult<()> {
        self.inner.reload()?;
        self.forget_default()
    }

    fn save(&self) -> StorageResult<()> {
        self.inner.save()
    }

    fn force_save(&self) -> StorageResult<()> {
        self.inner.force_save()
    }

    fn is_auto_save(&self) -> bool {
        self.inner.is_auto_save()
    }

    fn set_auto_save(&self, auto_save: bool) {
        self.inner.set_auto_save(auto_save)
    }

    fn world(&self) -> &str {
        self.inner.world()
    }

    fn entry_type(&self) -> EntryType {
        EntryType::Group
    }
}

impl GroupStorage for SqlGroupStorage {
    fn is_default(&self, name: &str) -> StorageResult<bool> {
        Ok(self.default_group()?.as_deref() == Some(name))
    }

    fn tracks(&self) -> StorageResult<IndexSet<String>> {
        let names = self
            .inner
            .shared()
            .with_conn(|conn| tracks::track_names(conn, self.inner.world_id()))?;
        Ok(names.into_iter().collect())
    }

    fn track(&self, track: &str) -> StorageResult<Vec<GroupWorld>> {
        self.inner
            .shared()
            .with_conn(|conn| tracks::track_members(conn, self.inner.world_id(), track))
    }
}
