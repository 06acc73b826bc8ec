//! PooledResource: one live connection plus its lease marker.
//!
//! A resource is idle, leased to exactly one thread, or destroyed. The lease
//! marker holds the leasing thread's token; taking and clearing it are single
//! compare-and-set operations, so only the leasing thread can give it back.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::source::ManagedConnection;

const UNLEASED: u64 = 0;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);
static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Non-zero identity of the calling thread.
pub(crate) fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|t| *t)
}

/// Live wrapper counters, kept for diagnostics.
#[derive(Debug, Default)]
pub(crate) struct WrapCounters {
    pub(crate) live: AtomicUsize,
    pub(crate) high_water: AtomicUsize,
}

impl WrapCounters {
    fn opened(&self) {
        let live = self.live.fetch_add(1, Ordering::AcqRel) + 1;
        self.high_water.fetch_max(live, Ordering::AcqRel);
    }

    fn closed(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct PooledResource<C: ManagedConnection> {
    id: u64,
    conn: Mutex<Option<C>>,
    owner: AtomicU64,
    last_use: Mutex<Instant>,
    counters: Arc<WrapCounters>,
}

impl<C: ManagedConnection> PooledResource<C> {
    pub(crate) fn new(conn: C, counters: Arc<WrapCounters>) -> Self {
        counters.opened();
        Self {
            id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
            conn: Mutex::new(Some(conn)),
            owner: AtomicU64::new(UNLEASED),
            last_use: Mutex::new(Instant::now()),
            counters,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Claim the lease for the calling thread.
    pub(crate) fn lease(&self) -> bool {
        let claimed = self
            .owner
            .compare_exchange(
                UNLEASED,
                current_thread_token(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if claimed {
            self.touch();
        }
        claimed
    }

    /// Clear the lease, but only if the calling thread holds it.
    pub(crate) fn expire_lease(&self) -> bool {
        self.owner
            .compare_exchange(
                current_thread_token(),
                UNLEASED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn is_held_by_current(&self) -> bool {
        self.owner.load(Ordering::Acquire) == current_thread_token()
    }

    pub(crate) fn touch(&self) {
        *self.last_use.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_use
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Validation errors count as invalid; they are logged, never raised.
    pub(crate) fn is_valid(&self, timeout: Duration) -> bool {
        let guard = match self.conn.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        match guard.as_ref() {
            None => false,
            Some(conn) => match conn.is_valid(timeout) {
                Ok(valid) => valid,
                Err(e) => {
                    tracing::warn!(resource = self.id, error = %e, "connection validation failed");
                    false
                }
            },
        }
    }

    pub(crate) fn conn(&self) -> Option<MutexGuard<'_, Option<C>>> {
        self.conn.lock().ok()
    }

    /// Close the connection. Returns `false` if it was already destroyed.
    pub(crate) fn destroy(&self) -> bool {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match conn {
            Some(conn) => {
                if let Err(e) = conn.close() {
                    tracing::warn!(resource = self.id, error = %e, "error closing connection");
                }
                self.counters.closed();
                tracing::debug!(resource = self.id, "connection destroyed");
                true
            }
            None => false,
        }
    }
}

impl<C: ManagedConnection> Drop for PooledResource<C> {
    fn drop(&mut self) {
        self.destroy();
    }
}
