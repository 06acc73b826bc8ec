//! CachedStorage: memoizing decorator over any `Storage`.
//!
//! Reads populate per-name tables on first use. Writes go to the wrapped
//! store first and update the cache only once that succeeds; a failed write
//! invalidates the affected cache entry and returns the error. Each
//! read-check-populate and write-update runs under the key's map lock, so a
//! name is fetched from the wrapped store at most once until invalidated.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexSet;
use permstore_core::errors::{StorageError, StorageResult};
use permstore_core::traits::{GroupStorage, Storage};
use permstore_core::types::{DataValue, EntryType, GroupWorld};

/// A typed metadata value, as last read or written.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TypedValue {
    Int(i64),
    Double(f64),
    Bool(bool),
}

/// What is known about one metadata path.
///
/// The stored text and typed reads are kept apart: a typed read parses the
/// text, so its value cannot stand in for the text itself.
#[derive(Debug, Clone, Default, PartialEq)]
struct CachedPath {
    /// `None`: not looked up. `Some(None)`: confirmed absent.
    text: Option<Option<String>>,
    typed: Option<TypedValue>,
}

impl CachedPath {
    fn absent() -> Self {
        Self {
            text: Some(None),
            typed: None,
        }
    }

    fn is_absent(&self) -> bool {
        matches!(self.text, Some(None))
    }
}

impl From<&DataValue> for CachedPath {
    fn from(value: &DataValue) -> Self {
        let typed = match value {
            DataValue::Int(v) => Some(TypedValue::Int(*v)),
            DataValue::Double(v) => Some(TypedValue::Double(*v)),
            DataValue::Bool(v) => Some(TypedValue::Bool(*v)),
            DataValue::Text(_) => None,
        };
        Self {
            text: Some(Some(value.to_string())),
            typed,
        }
    }
}

/// Parent-link tables that must be forgotten together.
trait ParentLinks: Send + Sync {
    fn forget_parents(&self);
}

/// Caches over one database. Deleting a group cascades to the parent links
/// of every entry in every world, so a successful group delete clears the
/// parent tables of all members.
#[derive(Default)]
pub struct CacheGroup {
    members: RwLock<Vec<Weak<dyn ParentLinks>>>,
}

impl CacheGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add `cache` to the group. Members are held weakly.
    pub fn join<S: Storage + ?Sized + 'static>(&self, cache: &Arc<CachedStorage<S>>) {
        let member: Weak<dyn ParentLinks> = Arc::downgrade(cache) as Weak<dyn ParentLinks>;
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        members.retain(|m| m.strong_count() > 0);
        members.push(member);
    }

    pub fn len(&self) -> usize {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget_parents(&self) {
        let members: Vec<_> = self
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for member in members {
            member.forget_parents();
        }
    }
}

pub struct CachedStorage<S: Storage + ?Sized> {
    inner: Arc<S>,
    permissions: DashMap<String, HashSet<String>>,
    parents: DashMap<String, IndexSet<GroupWorld>>,
    data: DashMap<String, HashMap<String, CachedPath>>,
    group: Option<Arc<CacheGroup>>,
}

impl<S: Storage + ?Sized> ParentLinks for CachedStorage<S> {
    fn forget_parents(&self) {
        self.parents.clear();
    }
}

impl<S: Storage + ?Sized> CachedStorage<S> {
    /// Wrap `inner`. Wrapping another cached storage is refused.
    pub fn new(inner: Arc<S>) -> StorageResult<Self> {
        if inner.is_cached() {
            return Err(StorageError::NestedCache);
        }
        Ok(Self {
            inner,
            permissions: DashMap::new(),
            parents: DashMap::new(),
            data: DashMap::new(),
            group: None,
        })
    }

    /// Wrap `inner` as a member of `group`. The caller joins the returned
    /// cache to the group once it is behind an `Arc`.
    pub fn in_group(inner: Arc<S>, group: Arc<CacheGroup>) -> StorageResult<Self> {
        let mut cache = Self::new(inner)?;
        cache.group = Some(group);
        Ok(cache)
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Drop everything cached for `name`.
    pub fn invalidate(&self, name: &str) {
        self.permissions.remove(name);
        self.parents.remove(name);
        self.data.remove(name);
    }

    pub fn clear(&self) {
        self.permissions.clear();
        self.parents.clear();
        self.data.clear();
    }

    /// Number of names with cached permissions, parents, or data.
    pub fn cached_names(&self) -> usize {
        let mut names: HashSet<String> = HashSet::new();
        names.extend(self.permissions.iter().map(|e| e.key().clone()));
        names.extend(self.parents.iter().map(|e| e.key().clone()));
        names.extend(self.data.iter().map(|e| e.key().clone()));
        names.len()
    }

    fn is_self_link(&self, name: &str, parent: &GroupWorld) -> bool {
        self.inner.entry_type() == EntryType::Group
            && parent.world == self.inner.world()
            && parent.name == name
    }

    /// Typed read: trust a cached typed value only when it has the
    /// requested type, otherwise ask the wrapped store for that type. The
    /// stored text is never replaced by a typed read.
    fn typed<T, P, F, W>(&self, name: &str, path: &str, pick: P, fetch: F, wrap: W) -> StorageResult<Option<T>>
    where
        T: Copy,
        P: Fn(TypedValue) -> Option<T>,
        F: FnOnce() -> StorageResult<Option<T>>,
        W: Fn(T) -> TypedValue,
    {
        let mut paths = self.data.entry(name.to_string()).or_default();
        if let Some(cached) = paths.get(path) {
            if cached.is_absent() {
                return Ok(None);
            }
            if let Some(v) = cached.typed.and_then(&pick) {
                return Ok(Some(v));
            }
        }
        let fetched = fetch()?;
        // A miss here may be text that does not parse; only hits are cached.
        if let Some(v) = fetched {
            paths.entry(path.to_string()).or_default().typed = Some(wrap(v));
        }
        Ok(fetched)
    }
}

impl TypedValue {
    fn int(self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    fn double(self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    fn bool(self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// Forward a write for a whole-set table. The cached set, if any, is updated
/// only after the wrapped write succeeds and dropped if it fails.
fn write_through<V, W, U>(table: &DashMap<String, V>, name: &str, write: W, update: U) -> StorageResult<()>
where
    W: FnOnce() -> StorageResult<()>,
    U: FnOnce(&mut V),
{
    match table.entry(name.to_string()) {
        Entry::Occupied(mut cached) => match write() {
            Ok(()) => {
                update(cached.get_mut());
                Ok(())
            }
            Err(e) => {
                cached.remove();
                Err(e)
            }
        },
        // Not cached: nothing to update, but hold the key so a concurrent
        // read cannot cache the pre-write state.
        Entry::Vacant(_) => write(),
    }
}

impl<S: Storage + ?Sized> Storage for CachedStorage<S> {
    fn permissions(&self, name: &str) -> StorageResult<HashSet<String>> {
        match self.permissions.entry(name.to_string()) {
            Entry::Occupied(cached) => Ok(cached.get().clone()),
            Entry::Vacant(slot) => {
                let fetched = self.inner.permissions(name)?;
                Ok(slot.insert(fetched).value().clone())
            }
        }
    }

    fn add_permission(&self, name: &str, permission: &str) -> StorageResult<()> {
        write_through(
            &self.permissions,
            name,
            || self.inner.add_permission(name, permission),
            |perms| {
                perms.insert(permission.to_string());
            },
        )
    }

    fn remove_permission(&self, name: &str, permission: &str) -> StorageResult<()> {
        write_through(
            &self.permissions,
            name,
            || self.inner.remove_permission(name, permission),
            |perms| {
                perms.remove(permission);
            },
        )
    }

    fn parents(&self, name: &str) -> StorageResult<IndexSet<GroupWorld>> {
        match self.parents.entry(name.to_string()) {
            Entry::Occupied(cached) => Ok(cached.get().clone()),
            Entry::Vacant(slot) => {
                let fetched = self.inner.parents(name)?;
                Ok(slot.insert(fetched).value().clone())
            }
        }
    }

    fn add_parent(&self, name: &str, world: &str, group: &str) -> StorageResult<()> {
        write_through(
            &self.parents,
            name,
            || self.inner.add_parent(name, world, group),
            |parents| {
                let parent = GroupWorld::new(world, group);
                if !self.is_self_link(name, &parent) {
                    parents.insert(parent);
                }
            },
        )
    }

    fn remove_parent(&self, name: &str, world: &str, group: &str) -> StorageResult<()> {
        write_through(
            &self.parents,
            name,
            || self.inner.remove_parent(name, world, group),
            |parents| {
                parents.shift_remove(&GroupWorld::new(world, group));
            },
        )
    }

    fn set_parents(&self, name: &str, parents: &IndexSet<GroupWorld>) -> StorageResult<()> {
        let slot = self.parents.entry(name.to_string());
        match self.inner.set_parents(name, parents) {
            Ok(()) => {
                let stored: IndexSet<GroupWorld> = parents
                    .iter()
                    .filter(|p| !self.is_self_link(name, p))
                    .cloned()
                    .collect();
                slot.insert(stored);
                Ok(())
            }
            Err(e) => {
                if let Entry::Occupied(cached) = slot {
                    cached.remove();
                }
                Err(e)
            }
        }
    }

    fn entries(&self) -> StorageResult<HashSet<String>> {
        self.inner.entries()
    }

    fn create(&self, name: &str) -> StorageResult<bool> {
        self.inner.create(name)
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        self.invalidate(name);
        let deleted = self.inner.delete(name)?;
        // A read racing the delete may have refilled the tables.
        self.invalidate(name);
        if deleted && self.inner.entry_type() == EntryType::Group {
            // Links to the group are gone from every entry that had it as a parent.
            match &self.group {
                Some(group) => group.forget_parents(),
                None => self.parents.clear(),
            }
        }
        Ok(deleted)
    }

    fn get_string(&self, name: &str, path: &str) -> StorageResult<Option<String>> {
        let mut paths = self.data.entry(name.to_string()).or_default();
        if let Some(text) = paths.get(path).and_then(|cached| cached.text.clone()) {
            return Ok(text);
        }
        let fetched = self.inner.get_string(name, path)?;
        paths.entry(path.to_string()).or_default().text = Some(fetched.clone());
        Ok(fetched)
    }

    fn get_int(&self, name: &str, path: &str) -> StorageResult<Option<i64>> {
        self.typed(
            name,
            path,
            TypedValue::int,
            || self.inner.get_int(name, path),
            TypedValue::Int,
        )
    }

    fn get_double(&self, name: &str, path: &str) -> StorageResult<Option<f64>> {
        self.typed(
            name,
            path,
            TypedValue::double,
            || self.inner.get_double(name, path),
            TypedValue::Double,
        )
    }

    fn get_bool(&self, name: &str, path: &str) -> StorageResult<Option<bool>> {
        self.typed(
            name,
            path,
            TypedValue::bool,
            || self.inner.get_bool(name, path),
            TypedValue::Bool,
        )
    }

    fn set_data(&self, name: &str, path: &str, value: &DataValue) -> StorageResult<()> {
        let mut paths = self.data.entry(name.to_string()).or_default();
        match self.inner.set_data(name, path, value) {
            Ok(()) => {
                paths.insert(path.to_string(), CachedPath::from(value));
                Ok(())
            }
            Err(e) => {
                paths.remove(path);
                Err(e)
            }
        }
    }

    fn remove_data(&self, name: &str, path: &str) -> StorageResult<()> {
        let mut paths = self.data.entry(name.to_string()).or_default();
        match self.inner.remove_data(name, path) {
            Ok(()) => {
                paths.insert(path.to_string(), CachedPath::absent());
                Ok(())
            }
            Err(e) => {
                paths.remove(path);
                Err(e)
            }
        }
    }

    fn reload(&self) -> StorageResult<()> {
        let result = self.inner.reload();
        self.clear();
        tracing::debug!(world = %self.inner.world(), kind = %self.inner.entry_type(), "cache cleared on reload");
        result
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
        self.inner.entry_type()
    }

    fn is_cached(&self) -> bool {
        true
    }
}

impl<S: GroupStorage + ?Sized> GroupStorage for CachedStorage<S> {
    fn is_default(&self, name: &str) -> StorageResult<bool> {
        self.inner.is_default(name)
    }

    fn tracks(&self) -> StorageResult<IndexSet<String>> {
        self.inner.tracks()
    }

    fn track(&self, track: &str) -> StorageResult<Vec<GroupWorld>> {
        self.inner.track(track)
    }
}
