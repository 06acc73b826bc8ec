//! permstore-core: shared vocabulary for the permissions store.
//!
//! - Types: entry roles, world-qualified group references, metadata values
//! - Traits: the `Storage` contract and its group-only extensions
//! - Errors: one `thiserror` enum per subsystem
//! - Config: layered TOML configuration
//! - Tracing: subscriber setup

pub mod config;
pub mod errors;
pub mod tracing_setup;
pub mod traits;
pub mod types;

pub use config::StoreConfig;
pub use errors::{StorageError, StorageResult};
pub use traits::{GroupStorage, Storage};
pub use types::{DataValue, EntryType, GroupWorld};
