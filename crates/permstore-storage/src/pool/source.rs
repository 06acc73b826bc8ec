//! Connection source traits: what the pool needs from a driver.

use std::fmt::Display;
use std::time::Duration;

/// A live connection the pool can validate and close.
pub trait ManagedConnection: Send + 'static {
    type Error: Display;

    /// Whether the connection is still usable, answered within `timeout`.
    /// Drivers that cannot tell report valid.
    fn is_valid(&self, _timeout: Duration) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn close(self) -> Result<(), Self::Error>;
}

/// Produces new connections on pool misses.
pub trait ConnectionSource: Send + Sync + 'static {
    type Connection: ManagedConnection;

    fn connect(&self) -> Result<Self::Connection, <Self::Connection as ManagedConnection>::Error>;
}
