//! SQLite connection source and the pragmas applied to every pooled connection.
//!
//! WAL mode, NORMAL sync, foreign_keys ON, 5s busy_timeout.

use std::time::Duration;

use permstore_core::config::StorageConfig;
use rusqlite::{Connection, OpenFlags};

use super::source::{ConnectionSource, ManagedConnection};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply the per-connection pragmas.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)
}

impl ManagedConnection for Connection {
    type Error = rusqlite::Error;

    /// Runs a trivial query under `timeout`. A connection left inside an open
    /// transaction is reported invalid so it never goes back into rotation.
    fn is_valid(&self, timeout: Duration) -> Result<bool, Self::Error> {
        self.busy_timeout(timeout)?;
        let selected = self.query_row("SELECT 1", [], |row| row.get::<_, i64>(0));
        self.busy_timeout(BUSY_TIMEOUT)?;
        Ok(selected? == 1 && self.is_autocommit())
    }

    fn close(self) -> Result<(), Self::Error> {
        Connection::close(self).map_err(|(_, e)| e)
    }
}

/// Opens connections to one SQLite database path or `file:` URI.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    uri: String,
    flags: OpenFlags,
}

impl SqliteSource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            flags: OpenFlags::default(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.effective_uri())
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl ConnectionSource for SqliteSource {
    type Connection = Connection;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open_with_flags(&self.uri, self.flags)?;
        apply_pragmas(&conn)?;
        Ok(conn)
    }
}
