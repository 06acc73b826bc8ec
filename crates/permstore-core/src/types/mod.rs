//! Value types shared by every storage implementation.

pub mod data_value;
pub mod entry_type;
pub mod group_world;

pub use data_value::DataValue;
pub use entry_type::EntryType;
pub use group_world::GroupWorld;
