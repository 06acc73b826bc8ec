//! SqlBackend: owns the connection pool, the world-id cache, and one shared
//! store per (world, role).

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use permstore_core::config::{Dbms, PoolConfig, StoreConfig};
use permstore_core::errors::{PoolError, StorageResult};
use permstore_core::types::EntryType;
use rusqlite::Connection;

use super::context::QueryContext;
use super::entry_storage::SqlEntryStorage;
use super::group_storage::SqlGroupStorage;
use crate::migrations;
use crate::pool::{ConnectionPool, PoolStats, SqliteSource};
use crate::queries;
use crate::task::PeriodicTask;

pub type SqlitePool = ConnectionPool<SqliteSource>;

/// State every store of one backend shares.
pub(crate) struct BackendShared {
    pool: SqlitePool,
    worlds: DashMap<String, i64>,
    pool_config: PoolConfig,
}

impl BackendShared {
    pub(crate) fn with_conn<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        self.pool.with_conn(f)
    }

    /// Id of `world` on `conn`, creating the world on first reference.
    pub(crate) fn world_id(&self, conn: &Connection, world: &str) -> StorageResult<i64> {
        if let Some(id) = self.worlds.get(world).map(|id| *id) {
            return Ok(id);
        }
        let id = queries::worlds::ensure_world(conn, world)?;
        self.worlds.insert(world.to_string(), id);
        Ok(id)
    }

    /// Id of `world` if it exists. Never creates it.
    pub(crate) fn find_world_id(&self, conn: &Connection, world: &str) -> StorageResult<Option<i64>> {
        if let Some(id) = self.worlds.get(world).map(|id| *id) {
            return Ok(Some(id));
        }
        let found = queries::worlds::find_world(conn, world)?;
        if let Some(id) = found {
            self.worlds.insert(world.to_string(), id);
        }
        Ok(found)
    }

    pub(crate) fn query_context<'c>(
        &self,
        conn: &'c Connection,
        queries: &[&'static str],
    ) -> QueryContext<'c> {
        QueryContext::new(conn, queries, &self.pool_config)
    }
}

/// Entry point for SQL-backed storage.
///
/// Open once at startup, hand out stores per world, close at shutdown.
/// Closing stops background work and shuts the pool down; stores handed out
/// earlier fail with [`PoolError::Unavailable`] afterwards.
pub struct SqlBackend {
    shared: Arc<BackendShared>,
    users: DashMap<String, Arc<SqlEntryStorage>>,
    groups: DashMap<String, Arc<SqlGroupStorage>>,
    flush_task: Mutex<Option<PeriodicTask>>,
    uri: String,
    closed: AtomicBool,
}

impl SqlBackend {
    /// Open the configured database and bring its schema up to date.
    pub fn open(config: &StoreConfig) -> StorageResult<Self> {
        let source = match config.storage.effective_dbms() {
            Dbms::Sqlite => SqliteSource::from_config(&config.storage),
        };
        Self::with_source(source, config)
    }

    pub fn with_source(source: SqliteSource, config: &StoreConfig) -> StorageResult<Self> {
        let uri = source.uri().to_string();
        let pool = ConnectionPool::new(source, &config.pool)?;
        let version = pool.with_conn(migrations::run_migrations)?;

        let shared = Arc::new(BackendShared {
            pool,
            worlds: DashMap::new(),
            pool_config: config.pool.clone(),
        });

        let flush_task = match config.effective_reload_interval() {
            Some(period) => {
                let weak = Arc::downgrade(&shared);
                let task = PeriodicTask::start("permstore-world-flush", period, move || {
                    match weak.upgrade() {
                        Some(shared) => {
                            shared.worlds.clear();
                            tracing::debug!("world id cache flushed");
                            ControlFlow::Continue(())
                        }
                        None => ControlFlow::Break(()),
                    }
                })?;
                Some(task)
            }
            None => None,
        };

        tracing::info!(uri = %uri, schema_version = version, "storage backend opened");
        Ok(Self {
            shared,
            users: DashMap::new(),
            groups: DashMap::new(),
            flush_task: Mutex::new(flush_task),
            uri,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Unavailable.into());
        }
        Ok(())
    }

    /// The shared user store for `world`.
    pub fn user_storage(&self, world: &str) -> StorageResult<Arc<SqlEntryStorage>> {
        self.ensure_open()?;
        if let Some(store) = self.users.get(world) {
            return Ok(Arc::clone(store.value()));
        }
        let store = Arc::new(SqlEntryStorage::open(
            Arc::clone(&self.shared),
            world,
            EntryType::User,
        )?);
        let entry = self.users.entry(world.to_string()).or_insert(store);
        Ok(Arc::clone(entry.value()))
    }

    /// The shared group store for `world`.
    pub fn group_storage(&self, world: &str) -> StorageResult<Arc<SqlGroupStorage>> {
        self.ensure_open()?;
        if let Some(store) = self.groups.get(world) {
            return Ok(Arc::clone(store.value()));
        }
        let store = Arc::new(SqlGroupStorage::open(Arc::clone(&self.shared), world)?);
        let entry = self.groups.entry(world.to_string()).or_insert(store);
        Ok(Arc::clone(entry.value()))
    }

    /// Every world in the database.
    pub fn worlds(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        self.shared.with_conn(queries::worlds::list_worlds)
    }

    /// Forget cached world ids; they are resolved again on next use.
    pub fn clear_world_cache(&self) {
        self.shared.worlds.clear();
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the flush task, drop the store registry, and shut the pool down.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let task = self
            .flush_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.stop();
        }
        self.users.clear();
        self.groups.clear();
        self.shared.worlds.clear();
        self.shared.pool.shutdown_all();
        tracing::info!(uri = %self.uri, "storage backend closed");
    }
}

impl Drop for SqlBackend {
    fn drop(&mut self) {
        self.close();
    }
}

