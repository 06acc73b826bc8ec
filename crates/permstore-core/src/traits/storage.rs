use std::collections::HashSet;

use indexmap::IndexSet;

use crate::errors::StorageResult;
use crate::types::{DataValue, EntryType, GroupWorld};

/// Read/write contract for the entries of one role (users or groups) in one
/// world: permissions, ordered parents, and path/value metadata.
pub trait Storage: Send + Sync {
    // --- Permissions ---
    fn permissions(&self, name: &str) -> StorageResult<HashSet<String>>;
    fn add_permission(&self, name: &str, permission: &str) -> StorageResult<()>;
    fn remove_permission(&self, name: &str, permission: &str) -> StorageResult<()>;

    // --- Inheritance ---
    fn parents(&self, name: &str) -> StorageResult<IndexSet<GroupWorld>>;
    fn add_parent(&self, name: &str, world: &str, group: &str) -> StorageResult<()>;
    fn remove_parent(&self, name: &str, world: &str, group: &str) -> StorageResult<()>;
    fn set_parents(&self, name: &str, parents: &IndexSet<GroupWorld>) -> StorageResult<()>;

    // --- Entries ---
    fn entries(&self) -> StorageResult<HashSet<String>>;
    /// Returns `true` when the entry did not exist before.
    fn create(&self, name: &str) -> StorageResult<bool>;
    /// Returns `true` when an entry was removed.
    fn delete(&self, name: &str) -> StorageResult<bool>;

    // --- Metadata ---
    fn get_string(&self, name: &str, path: &str) -> StorageResult<Option<String>>;
    fn get_int(&self, name: &str, path: &str) -> StorageResult<Option<i64>>;
    fn get_double(&self, name: &str, path: &str) -> StorageResult<Option<f64>>;
    fn get_bool(&self, name: &str, path: &str) -> StorageResult<Option<bool>>;
    fn set_data(&self, name: &str, path: &str, value: &DataValue) -> StorageResult<()>;
    fn remove_data(&self, name: &str, path: &str) -> StorageResult<()>;

    // --- Lifecycle ---
    fn reload(&self) -> StorageResult<()>;
    fn save(&self) -> StorageResult<()>;
    fn force_save(&self) -> StorageResult<()>;
    fn is_auto_save(&self) -> bool;
    fn set_auto_save(&self, auto_save: bool);

    fn world(&self) -> &str;
    fn entry_type(&self) -> EntryType;

    /// Whether this storage is a caching decorator. Used to refuse stacking
    /// one cache on top of another.
    fn is_cached(&self) -> bool {
        false
    }
}

/// Group-only extensions: the world's default group and tracks.
pub trait GroupStorage: Storage {
    fn is_default(&self, name: &str) -> StorageResult<bool>;
    fn tracks(&self) -> StorageResult<IndexSet<String>>;
    /// Ordered members of `track`. Unknown tracks yield an empty list.
    fn track(&self, track: &str) -> StorageResult<Vec<GroupWorld>>;
}
