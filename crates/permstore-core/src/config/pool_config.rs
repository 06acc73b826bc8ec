//! Connection and statement pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sizing and timing knobs for the connection pool, its reaper, and the
/// statement pools bound to pooled connections.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle queue capacity. Default: 5.
    pub max_connections: Option<usize>,
    /// Deadline for a connection validity check, in milliseconds. Default: 1000.
    pub validation_timeout_ms: Option<u64>,
    /// Reaper period in seconds. Default: 300.
    pub reap_interval_secs: Option<u64>,
    /// Idle age after which the reaper retires a connection. Default: 1800.
    pub idle_timeout_secs: Option<u64>,
    /// Reaper poll timeout while draining, in milliseconds. Default: 5.
    pub reap_poll_ms: Option<u64>,
    /// Idle capacity of each statement pool. Default: 5.
    pub statement_pool_size: Option<usize>,
    /// Statement checkout/return timeout, in microseconds. Default: 100.
    pub statement_timeout_us: Option<u64>,
}

impl PoolConfig {
    pub fn effective_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(5)
    }

    pub fn effective_validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms.unwrap_or(1000))
    }

    pub fn effective_reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.unwrap_or(5 * 60))
    }

    pub fn effective_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(30 * 60))
    }

    pub fn effective_reap_poll(&self) -> Duration {
        Duration::from_millis(self.reap_poll_ms.unwrap_or(5))
    }

    pub fn effective_statement_pool_size(&self) -> usize {
        self.statement_pool_size.unwrap_or(5)
    }

    pub fn effective_statement_timeout(&self) -> Duration {
        Duration::from_micros(self.statement_timeout_us.unwrap_or(100))
    }
}
