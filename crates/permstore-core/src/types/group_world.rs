//! A group reference qualified by its world.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A `(world, group)` pair used for parent links and track members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupWorld {
    pub world: String,
    pub name: String,
}

impl GroupWorld {
    pub fn new(world: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            world: world.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for GroupWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.world, self.name)
    }
}
