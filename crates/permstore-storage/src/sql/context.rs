//! QueryContext: statement pools bound to one leased connection.
//!
//! Built for a fixed set of SQL texts when an operation starts, retired when
//! it ends. Retiring closes every pool, finalizing the statements they hold.

use std::collections::HashMap;

use permstore_core::config::PoolConfig;
use permstore_core::errors::{StatementError, StorageError};
use rusqlite::{Connection, Statement};

use crate::statement::StatementPool;

pub struct QueryContext<'conn> {
    pools: HashMap<&'static str, StatementPool<&'conn Connection>>,
}

impl<'conn> QueryContext<'conn> {
    pub fn new(conn: &'conn Connection, queries: &[&'static str], config: &PoolConfig) -> Self {
        let pools = queries
            .iter()
            .map(|&sql| {
                let pool = StatementPool::new(
                    conn,
                    sql,
                    config.effective_statement_pool_size(),
                    config.effective_statement_timeout(),
                );
                (sql, pool)
            })
            .collect();
        Self { pools }
    }

    pub fn pool(&self, sql: &str) -> Result<&StatementPool<&'conn Connection>, StatementError> {
        self.pools.get(sql).ok_or_else(|| StatementError::PoolClosed {
            sql: sql.to_string(),
        })
    }

    /// Check out a statement for `sql`, run `f`, and hand the statement back.
    pub fn with_statement<F, T>(&self, sql: &str, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Statement<'conn>) -> Result<T, StorageError>,
    {
        let handle = self.pool(sql)?.checkout()?;
        let result = handle.with(f);
        handle.close();
        result
    }

    /// Close every pool now rather than on drop. Returns how many idle
    /// statements were finalized.
    pub fn retire(self) -> usize {
        self.pools.values().map(StatementPool::close).sum()
    }
}

impl Drop for QueryContext<'_> {
    fn drop(&mut self) {
        for pool in self.pools.values() {
            pool.close();
        }
    }
}
