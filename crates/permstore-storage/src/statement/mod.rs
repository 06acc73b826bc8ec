//! Statement pool: reuses compiled statements for one SQL text on one
//! connection.
//!
//! Checkout and return share a read lock; `close` takes the write lock, so a
//! pool-wide close never overlaps a checkout or return in flight, and nothing
//! checked out or returned after it goes back into rotation.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use permstore_core::errors::StatementError;
use rusqlite::{Connection, Statement};

/// Compiles and disposes of statements for a [`StatementPool`].
pub trait StatementSource {
    type Statement;
    type Error: Display;

    fn prepare(&self, sql: &str) -> Result<Self::Statement, Self::Error>;
    fn finalize(&self, statement: Self::Statement) -> Result<(), Self::Error>;
}

impl<'conn> StatementSource for &'conn Connection {
    type Statement = Statement<'conn>;
    type Error = rusqlite::Error;

    fn prepare(&self, sql: &str) -> Result<Statement<'conn>, rusqlite::Error> {
        Connection::prepare(*self, sql)
    }

    fn finalize(&self, statement: Statement<'conn>) -> Result<(), rusqlite::Error> {
        statement.finalize()
    }
}

pub struct StatementPool<S: StatementSource> {
    source: S,
    sql: String,
    idle_tx: Sender<S::Statement>,
    idle_rx: Receiver<S::Statement>,
    timeout: Duration,
    lock: RwLock<()>,
    closed: AtomicBool,
}

impl<S: StatementSource> StatementPool<S> {
    /// `capacity` bounds the idle statements kept; `timeout` bounds how long
    /// checkout waits for an idle one and how long a return waits for room.
    pub fn new(source: S, sql: impl Into<String>, capacity: usize, timeout: Duration) -> Self {
        let (idle_tx, idle_rx) = bounded(capacity.max(1));
        Self {
            source,
            sql: sql.into(),
            idle_tx,
            idle_rx,
            timeout,
            lock: RwLock::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Take an idle statement, or compile a new one if none shows up in time.
    pub fn checkout(&self) -> Result<PooledStatement<'_, S>, StatementError> {
        let _shared = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return Err(StatementError::PoolClosed {
                sql: self.sql.clone(),
            });
        }

        let statement = match self.idle_rx.recv_timeout(self.timeout) {
            Ok(statement) => statement,
            Err(_) => self
                .source
                .prepare(&self.sql)
                .map_err(|e| StatementError::PrepareFailed {
                    sql: self.sql.clone(),
                    message: e.to_string(),
                })?,
        };

        Ok(PooledStatement {
            pool: self,
            statement: Mutex::new(Some(statement)),
        })
    }

    fn give_back(&self, statement: S::Statement) {
        let _shared = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            self.finalize(statement);
            return;
        }
        if let Err(e) = self.idle_tx.send_timeout(statement, self.timeout) {
            self.finalize(e.into_inner());
        }
    }

    fn finalize(&self, statement: S::Statement) {
        if let Err(e) = self.source.finalize(statement) {
            tracing::warn!(sql = %self.sql, error = %e, "failed to finalize statement");
        }
    }

    /// Close the pool and finalize every idle statement. Returns how many
    /// were finalized; a second call does nothing.
    pub fn close(&self) -> usize {
        let _exclusive = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let mut drained = 0;
        while let Ok(statement) = self.idle_rx.try_recv() {
            self.finalize(statement);
            drained += 1;
        }
        tracing::debug!(sql = %self.sql, drained, "statement pool closed");
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn idle_count(&self) -> usize {
        self.idle_rx.len()
    }
}

impl<S: StatementSource> Drop for StatementPool<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A checked-out statement. Closing it hands the statement back exactly once.
pub struct PooledStatement<'p, S: StatementSource> {
    pool: &'p StatementPool<S>,
    statement: Mutex<Option<S::Statement>>,
}

impl<S: StatementSource> PooledStatement<'_, S> {
    /// Run `f` with the statement. Fails once the handle is closed.
    pub fn with<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut S::Statement) -> Result<T, E>,
        E: From<StatementError>,
    {
        let mut guard = self
            .statement
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let statement = guard.as_mut().ok_or(StatementError::HandleClosed)?;
        f(statement)
    }

    /// Return the statement to its pool. Only the first call does anything.
    pub fn close(&self) -> bool {
        let taken = self
            .statement
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(statement) => {
                self.pool.give_back(statement);
                true
            }
            None => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.statement
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<S: StatementSource> Drop for PooledStatement<'_, S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use permstore_core::errors::StorageError;

    use super::*;

    fn pool(conn: &Connection) -> StatementPool<&Connection> {
        StatementPool::new(conn, "SELECT ?1 + 1", 2, Duration::from_micros(100))
    }

    #[test]
    fn statement_is_reused_after_close() {
        let conn = Connection::open_in_memory().unwrap();
        let pool = pool(&conn);
        let handle = pool.checkout().unwrap();
        let value: i64 = handle
            .with(|stmt| {
                stmt.query_row([41], |row| row.get(0))
                    .map_err(|e| StorageError::Sqlite {
                        message: e.to_string(),
                    })
            })
            .unwrap();
        assert_eq!(value, 42);
        assert!(handle.close());
        assert!(!handle.close());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn closed_handle_rejects_use() {
        let conn = Connection::open_in_memory().unwrap();
        let pool = pool(&conn);
        let handle = pool.checkout().unwrap();
        handle.close();
        assert!(!handle.is_valid());
        let err = handle.with(|_| Ok::<_, StatementError>(())).unwrap_err();
        assert!(matches!(err, StatementError::HandleClosed));
    }

    #[test]
    fn bad_sql_fails_to_prepare() {
        let conn = Connection::open_in_memory().unwrap();
        let pool = StatementPool::new(&conn, "SELEC nonsense", 1, Duration::from_micros(100));
        assert!(matches!(
            pool.checkout().err(),
            Some(StatementError::PrepareFailed { .. })
        ));
    }

    #[test]
    fn pool_close_finalizes_idle_and_refuses_checkout() {
        let conn = Connection::open_in_memory().unwrap();
        let pool = pool(&conn);
        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        a.close();
        assert_eq!(pool.close(), 1);
        assert_eq!(pool.close(), 0);
        assert!(matches!(
            pool.checkout().err(),
            Some(StatementError::PoolClosed { .. })
        ));
        // Returned after close: finalized, not pooled.
        b.close();
        assert_eq!(pool.idle_count(), 0);
    }
}
