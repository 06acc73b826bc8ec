//! Database selection and connection settings.

use serde::{Deserialize, Serialize};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dbms {
    #[default]
    Sqlite,
}

impl Dbms {
    /// Parse a configured engine name. Unknown names fall back to SQLite.
    pub fn parse_or_default(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => Self::Sqlite,
            other => {
                tracing::warn!(dbms = other, "unsupported dbms, reverting to sqlite");
                Self::Sqlite
            }
        }
    }
}

/// Storage backend settings (`[storage]` table).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Database engine name. Default: "sqlite".
    pub dbms: Option<String>,
    /// Database path or `file:` URI. Default: "permissions.db".
    pub uri: Option<String>,
    /// Accepted for server databases; unused by SQLite.
    pub username: Option<String>,
    /// Accepted for server databases; unused by SQLite.
    pub password: Option<String>,
    /// Wrap stores in the caching decorator. Default: true.
    pub cache: Option<bool>,
}

impl StorageConfig {
    pub fn effective_dbms(&self) -> Dbms {
        self.dbms
            .as_deref()
            .map(Dbms::parse_or_default)
            .unwrap_or_default()
    }

    pub fn effective_uri(&self) -> &str {
        self.uri.as_deref().unwrap_or("permissions.db")
    }

    pub fn effective_cache(&self) -> bool {
        self.cache.unwrap_or(true)
    }
}
