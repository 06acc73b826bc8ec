//! Storage contracts implemented by the SQL backend and the cache decorator.

pub mod storage;

pub use storage::{GroupStorage, Storage};
