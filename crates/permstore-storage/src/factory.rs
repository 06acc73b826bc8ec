//! StorageFactory: builds the stores callers use, per configuration.
//!
//! With `storage.cache = true` every store is wrapped in [`CachedStorage`];
//! either way there is one shared store per (world, role). Cached stores
//! share one [`CacheGroup`], so a group delete in any world clears parent
//! links cached by all of them.

use std::sync::Arc;

use dashmap::DashMap;
use permstore_core::config::StoreConfig;
use permstore_core::errors::StorageResult;
use permstore_core::traits::{GroupStorage, Storage};

use crate::cache::{CacheGroup, CachedStorage};
use crate::sql::SqlBackend;

pub struct StorageFactory {
    backend: SqlBackend,
    cache: bool,
    cache_group: Arc<CacheGroup>,
    users: DashMap<String, Arc<dyn Storage>>,
    groups: DashMap<String, Arc<dyn GroupStorage>>,
}

impl StorageFactory {
    pub fn open(config: &StoreConfig) -> StorageResult<Self> {
        let backend = SqlBackend::open(config)?;
        Ok(Self::with_backend(backend, config.storage.effective_cache()))
    }

    pub fn with_backend(backend: SqlBackend, cache: bool) -> Self {
        Self {
            backend,
            cache,
            cache_group: CacheGroup::new(),
            users: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    pub fn user_storage(&self, world: &str) -> StorageResult<Arc<dyn Storage>> {
        if let Some(store) = self.users.get(world) {
            return Ok(Arc::clone(store.value()));
        }
        let sql = self.backend.user_storage(world)?;
        let store: Arc<dyn Storage> = if self.cache {
            let cached = Arc::new(CachedStorage::in_group(sql, Arc::clone(&self.cache_group))?);
            self.cache_group.join(&cached);
            cached
        } else {
            sql
        };
        let entry = self.users.entry(world.to_string()).or_insert(store);
        Ok(Arc::clone(entry.value()))
    }

    pub fn group_storage(&self, world: &str) -> StorageResult<Arc<dyn GroupStorage>> {
        if let Some(store) = self.groups.get(world) {
            return Ok(Arc::clone(store.value()));
        }
        let sql = self.backend.group_storage(world)?;
        let store: Arc<dyn GroupStorage> = if self.cache {
            let cached = Arc::new(CachedStorage::in_group(sql, Arc::clone(&self.cache_group))?);
            self.cache_group.join(&cached);
            cached
        } else {
            sql
        };
        let entry = self.groups.entry(world.to_string()).or_insert(store);
        Ok(Arc::clone(entry.value()))
    }

    pub fn is_caching(&self) -> bool {
        self.cache
    }

    /// Number of live cached stores sharing parent invalidation.
    pub fn cached_stores(&self) -> usize {
        self.cache_group.len()
    }

    pub fn backend(&self) -> &SqlBackend {
        &self.backend
    }

    /// Drop every store handed out so far and close the backend.
    pub fn close(&self) {
        self.users.clear();
        self.groups.clear();
        self.backend.close();
    }
}
