//! Backend selection.

use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};

use crate::error::StoreError;

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// SQLite file database with shared sessions
    Relational,
    /// Partitioned key/value tables
    Tables,
    /// In-memory lists (for testing and development)
    Memory,
}

impl FromStr for BackendType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relational" | "sqlite" => Ok(BackendType::Relational),
            "tables" | "table" => Ok(BackendType::Tables),
            "memory" | "mock" => Ok(BackendType::Memory),
            _ => Err(StoreError::Config(format!("unknown backend type: {s}"))),
        }
    }
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Relational => "relational",
            BackendType::Tables => "tables",
            BackendType::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the storage backend.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: BackendType,
    /// Database path for `Relational`, account label for `Tables`.
    pub connection_string: Option<SecretString>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: BackendType::Memory,
            connection_string: None,
        }
    }

    pub fn relational(path: impl Into<String>) -> Self {
        Self {
            backend: BackendType::Relational,
            connection_string: Some(SecretString::from(path.into())),
        }
    }

    pub fn tables() -> Self {
        Self {
            backend: BackendType::Tables,
            connection_string: None,
        }
    }

    pub(crate) fn expose_connection_string(&self) -> Option<&str> {
        self.connection_string.as_ref().map(|s| s.expose_secret())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_type_from_str() {
        assert_eq!("relational".parse::<BackendType>().unwrap(), BackendType::Relational);
        assert_eq!("SQLite".parse::<BackendType>().unwrap(), BackendType::Relational);
        assert_eq!("Tables".parse::<BackendType>().unwrap(), BackendType::Tables);
        assert_eq!("MEMORY".parse::<BackendType>().unwrap(), BackendType::Memory);
        assert!(matches!(
            "cassandra".parse::<BackendType>(),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn backend_type_as_str_roundtrips() {
        for backend in [BackendType::Relational, BackendType::Tables, BackendType::Memory] {
            assert_eq!(backend.as_str().parse::<BackendType>().unwrap(), backend);
        }
    }

    #[test]
    fn default_is_memory() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, BackendType::Memory);
        assert!(config.connection_string.is_none());
    }

    #[test]
    fn connection_string_is_redacted_in_debug() {
        let config = StorageConfig::relational("/var/lib/crudkit/catalog.db");
        assert_eq!(config.expose_connection_string(), Some("/var/lib/crudkit/catalog.db"));
        assert!(!format!("{config:?}").contains("catalog.db"));
    }
}
