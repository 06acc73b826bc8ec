//! Configuration for permstore.
//! TOML-based, 3-layer resolution: env > file > defaults.

pub mod pool_config;
pub mod storage_config;
pub mod store_config;

pub use pool_config::PoolConfig;
pub use storage_config::{Dbms, StorageConfig};
pub use store_config::StoreConfig;
