//! Entry role: user or group.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The role an entry plays. Users and groups with the same name in the same
/// world are distinct entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    User,
    Group,
}

impl EntryType {
    /// Discriminator stored in the `type` column of the entries table.
    pub fn as_db_flag(self) -> i64 {
        match self {
            Self::User => 0,
            Self::Group => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
