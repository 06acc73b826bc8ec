//! Connection pool: leases live connections to concurrent callers.
//!
//! Idle connections sit in a bounded queue. `acquire` polls the queue without
//! blocking and opens a new connection on a miss; the pool never blocks callers
//! past capacity. `release` puts the connection back, or destroys it when the
//! pool is shut down, the connection fails validation, or the queue is full.
//! A background reaper retires connections that sat idle too long.

mod resource;
pub mod source;
pub mod sqlite;

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use permstore_core::config::PoolConfig;
use permstore_core::errors::PoolError;

use self::resource::{PooledResource, WrapCounters};
use crate::task::PeriodicTask;

pub use self::source::{ConnectionSource, ManagedConnection};
pub use self::sqlite::SqliteSource;

type Resource<S> = PooledResource<<S as ConnectionSource>::Connection>;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections opened and not yet destroyed.
    pub live: usize,
    /// Most connections ever live at once.
    pub high_water: usize,
    /// Connections waiting in the idle queue.
    pub idle: usize,
    pub capacity: usize,
}

struct PoolInner<S: ConnectionSource> {
    source: S,
    idle_tx: Sender<Arc<Resource<S>>>,
    idle_rx: Receiver<Arc<Resource<S>>>,
    capacity: usize,
    shutdown: AtomicBool,
    counters: Arc<WrapCounters>,
    validation_timeout: Duration,
    idle_timeout: Duration,
    reap_poll: Duration,
}

impl<S: ConnectionSource> PoolInner<S> {
    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn acquire(this: &Arc<Self>) -> Result<Lease<S>, PoolError> {
        loop {
            if this.is_shut_down() {
                return Err(PoolError::Unavailable);
            }

            let resource = match this.idle_rx.try_recv() {
                Ok(resource) => {
                    if !resource.is_valid(this.validation_timeout) {
                        tracing::debug!(resource = resource.id(), "discarding invalid idle connection");
                        resource.destroy();
                        continue;
                    }
                    resource
                }
                Err(_) => this.open()?,
            };

            if this.is_shut_down() {
                resource.destroy();
                return Err(PoolError::Unavailable);
            }

            if resource.lease() {
                tracing::debug!(resource = resource.id(), "connection leased");
                return Ok(Lease {
                    pool: Arc::clone(this),
                    resource,
                    released: AtomicBool::new(false),
                });
            }
            // Someone else holds it; leave it with them and try again.
        }
    }

    fn open(&self) -> Result<Arc<Resource<S>>, PoolError> {
        let conn = self
            .source
            .connect()
            .map_err(|e| PoolError::ConnectFailed {
                message: e.to_string(),
            })?;
        let resource = Arc::new(PooledResource::new(conn, Arc::clone(&self.counters)));
        tracing::debug!(
            resource = resource.id(),
            live = self.counters.live.load(Ordering::Acquire),
            "opened connection"
        );
        Ok(resource)
    }

    fn release(&self, resource: &Arc<Resource<S>>) -> bool {
        if !resource.expire_lease() {
            return false;
        }
        resource.touch();

        if self.is_shut_down() || !resource.is_valid(self.validation_timeout) {
            resource.destroy();
            return true;
        }

        match self.idle_tx.try_send(Arc::clone(resource)) {
            Ok(()) => {
                // Shutdown may have drained the queue between the check and the push.
                if self.is_shut_down() {
                    self.drain();
                }
                tracing::debug!(resource = resource.id(), "connection returned");
            }
            Err(TrySendError::Full(resource)) | Err(TrySendError::Disconnected(resource)) => {
                tracing::debug!(resource = resource.id(), "idle queue full, closing connection");
                resource.destroy();
            }
        }
        true
    }

    /// Destroy everything in the idle queue.
    fn drain(&self) -> usize {
        let mut destroyed = 0;
        while let Ok(resource) = self.idle_rx.try_recv() {
            if resource.destroy() {
                destroyed += 1;
            }
        }
        destroyed
    }

    /// One reaper sweep. Drains at most one queue's worth, retires stale or
    /// invalid connections, and requeues the rest afterwards so a sweep always
    /// terminates.
    fn reap(&self) -> usize {
        let mut retired = 0;
        let mut keep = Vec::new();
        for _ in 0..self.capacity {
            let Ok(resource) = self.idle_rx.recv_timeout(self.reap_poll) else {
                break;
            };
            if resource.idle_for() > self.idle_timeout
                || !resource.is_valid(self.validation_timeout)
            {
                tracing::debug!(resource = resource.id(), "reaping idle connection");
                resource.destroy();
                retired += 1;
            } else {
                keep.push(resource);
            }
        }

        for resource in keep {
            if let Err(e) = self.idle_tx.try_send(resource) {
                e.into_inner().destroy();
            }
        }
        if self.is_shut_down() {
            self.drain();
        }
        retired
    }
}

/// A bounded pool of connections from one [`ConnectionSource`].
pub struct ConnectionPool<S: ConnectionSource> {
    inner: Arc<PoolInner<S>>,
    reaper: Mutex<Option<PeriodicTask>>,
}

impl<S: ConnectionSource> ConnectionPool<S> {
    /// Create the pool and start its reaper. No connection is opened until
    /// the first `acquire`.
    pub fn new(source: S, config: &PoolConfig) -> Result<Self, PoolError> {
        let capacity = config.effective_max_connections().max(1);
        let (idle_tx, idle_rx) = bounded(capacity);
        let inner = Arc::new(PoolInner {
            source,
            idle_tx,
            idle_rx,
            capacity,
            shutdown: AtomicBool::new(false),
            counters: Arc::new(WrapCounters::default()),
            validation_timeout: config.effective_validation_timeout(),
            idle_timeout: config.effective_idle_timeout(),
            reap_poll: config.effective_reap_poll(),
        });

        let weak = Arc::downgrade(&inner);
        let reaper = PeriodicTask::start(
            "permstore-pool-reaper",
            config.effective_reap_interval(),
            move || match weak.upgrade() {
                Some(inner) if !inner.is_shut_down() => {
                    let retired = inner.reap();
                    if retired > 0 {
                        tracing::debug!(retired, "reaper sweep");
                    }
                    ControlFlow::Continue(())
                }
                _ => ControlFlow::Break(()),
            },
        )?;

        tracing::info!(capacity, "connection pool started");
        Ok(Self {
            inner,
            reaper: Mutex::new(Some(reaper)),
        })
    }

    /// Lease a connection to the calling thread.
    pub fn acquire(&self) -> Result<Lease<S>, PoolError> {
        PoolInner::acquire(&self.inner)
    }

    /// Lease a connection for the duration of `f`.
    pub fn with_conn<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&S::Connection) -> Result<T, E>,
        E: From<PoolError>,
    {
        let lease = self.acquire()?;
        let result = lease.with_conn(f);
        lease.release();
        result
    }

    /// Stop the reaper and destroy every idle connection. Later `acquire`
    /// calls fail with [`PoolError::Unavailable`]. Outstanding leases stay
    /// usable and are destroyed when released. Idempotent.
    pub fn shutdown_all(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let reaper = self
            .reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reaper) = reaper {
            reaper.stop();
        }
        let destroyed = self.inner.drain();
        tracing::info!(destroyed, "connection pool shut down");
    }

    pub fn is_available(&self) -> bool {
        !self.inner.is_shut_down()
    }

    /// Run one reaper sweep now. Returns the number of retired connections.
    pub fn reap_idle(&self) -> usize {
        self.inner.reap()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.inner.counters.live.load(Ordering::Acquire),
            high_water: self.inner.counters.high_water.load(Ordering::Acquire),
            idle: self.inner.idle_rx.len(),
            capacity: self.inner.capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl<S: ConnectionSource> Drop for ConnectionPool<S> {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

/// A connection leased to the thread that acquired it.
///
/// Only that thread can give it back; a release from anywhere else is a
/// no-op. Dropping the lease releases it.
pub struct Lease<S: ConnectionSource> {
    pool: Arc<PoolInner<S>>,
    resource: Arc<Resource<S>>,
    released: AtomicBool,
}

impl<S: ConnectionSource> Lease<S> {
    pub fn id(&self) -> u64 {
        self.resource.id()
    }

    /// Run `f` against the leased connection.
    pub fn with_conn<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&S::Connection) -> Result<T, E>,
        E: From<PoolError>,
    {
        if self.released.load(Ordering::Acquire) || !self.resource.is_held_by_current() {
            return Err(PoolError::NotLeased.into());
        }
        let guard = self.resource.conn().ok_or(PoolError::LockPoisoned)?;
        let conn = guard.as_ref().ok_or(PoolError::ResourceGone)?;
        f(conn)
    }

    /// Give the connection back. Returns `false` when already released or
    /// when called from a thread that does not hold the lease.
    pub fn release(&self) -> bool {
        if self.released.load(Ordering::Acquire) {
            return false;
        }
        if !self.pool.release(&self.resource) {
            return false;
        }
        self.released.store(true, Ordering::Release);
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl<S: ConnectionSource> Drop for Lease<S> {
    fn drop(&mut self) {
        if !self.release() && !self.is_released() {
            // Dropped off the leasing thread: the connection closes once the
            // last reference goes away.
            tracing::debug!(resource = self.resource.id(), "lease dropped by non-owner");
        }
    }
}
