//! Top-level configuration with layered resolution.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{PoolConfig, StorageConfig};
use crate::errors::ConfigError;

/// Top-level configuration.
///
/// Resolution order (highest priority first):
/// 1. Environment variables (`PERMSTORE_*`)
/// 2. Config file (`permstore.toml` in the data directory)
/// 3. Compiled defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub storage: StorageConfig,
    pub pool: PoolConfig,
    /// Period of the world-id cache flush, in seconds. 0 disables it. Default: 0.
    pub reload_interval_secs: Option<u64>,
}

impl StoreConfig {
    /// Load configuration for the data directory `root`.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let file = root.join("permstore.toml");
        if file.exists() {
            Self::merge_toml_file(&mut config, &file)?;
        }

        Self::apply_env_overrides(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML string (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &StoreConfig) -> Result<(), ConfigError> {
        if config.pool.max_connections == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "pool.max_connections".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if config.pool.statement_pool_size == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "pool.statement_pool_size".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if config.pool.reap_interval_secs == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "pool.reap_interval_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Flush period for the world-id cache, if enabled.
    pub fn effective_reload_interval(&self) -> Option<Duration> {
        match self.reload_interval_secs.unwrap_or(0) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn merge_toml_file(config: &mut StoreConfig, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let file_config: StoreConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Self::merge(config, &file_config);
        Ok(())
    }

    /// Merge `other` into `base`; `other` wins wherever it has a value.
    fn merge(base: &mut StoreConfig, other: &StoreConfig) {
        // Storage
        if other.storage.dbms.is_some() {
            base.storage.dbms = other.storage.dbms.clone();
        }
        if other.storage.uri.is_some() {
            base.storage.uri = other.storage.uri.clone();
        }
        if other.storage.username.is_some() {
            base.storage.username = other.storage.username.clone();
        }
        if other.storage.password.is_some() {
            base.storage.password = other.storage.password.clone();
        }
        if other.storage.cache.is_some() {
            base.storage.cache = other.storage.cache;
        }

        // Pool
        if other.pool.max_connections.is_some() {
            base.pool.max_connections = other.pool.max_connections;
        }
        if other.pool.validation_timeout_ms.is_some() {
            base.pool.validation_timeout_ms = other.pool.validation_timeout_ms;
        }
        if other.pool.reap_interval_secs.is_some() {
            base.pool.reap_interval_secs = other.pool.reap_interval_secs;
        }
        if other.pool.idle_timeout_secs.is_some() {
            base.pool.idle_timeout_secs = other.pool.idle_timeout_secs;
        }
        if other.pool.reap_poll_ms.is_some() {
            base.pool.reap_poll_ms = other.pool.reap_poll_ms;
        }
        if other.pool.statement_pool_size.is_some() {
            base.pool.statement_pool_size = other.pool.statement_pool_size;
        }
        if other.pool.statement_timeout_us.is_some() {
            base.pool.statement_timeout_us = other.pool.statement_timeout_us;
        }

        if other.reload_interval_secs.is_some() {
            base.reload_interval_secs = other.reload_interval_secs;
        }
    }

    fn apply_env_overrides(config: &mut StoreConfig) {
        if let Ok(val) = std::env::var("PERMSTORE_DBMS") {
            config.storage.dbms = Some(val);
        }
        if let Ok(val) = std::env::var("PERMSTORE_URI") {
            config.storage.uri = Some(val);
        }
        if let Ok(val) = std::env::var("PERMSTORE_CACHE") {
            if let Ok(v) = val.parse::<bool>() {
                config.storage.cache = Some(v);
            }
        }
        if let Ok(val) = std::env::var("PERMSTORE_POOL_SIZE") {
            if let Ok(v) = val.parse::<usize>() {
                config.pool.max_connections = Some(v);
            }
        }
        if let Ok(val) = std::env::var("PERMSTORE_RELOAD_INTERVAL") {
            if let Ok(v) = val.parse::<u64>() {
                config.reload_interval_secs = Some(v);
            }
        }
    }
}
