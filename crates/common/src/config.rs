//! Configuration fragments shared by Parley binaries.

use crate::secret::SecretString;
use serde::Deserialize;
use std::fmt;

/// Default Postgres pool size.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Database configuration
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: SecretString,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("postgres_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Redis configuration
#[derive(Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL, may embed a password
    pub url: SecretString,
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &"[REDACTED]")
            .finish()
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_debug_redacts_url() {
        let config = DatabaseConfig {
            postgres_url: SecretString::from("postgres://user:pw@db/parley"),
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("pw@db"));
        assert!(debug.contains("max_connections: 10"));
    }

    #[test]
    fn test_redis_config_debug_redacts_url() {
        let config = RedisConfig {
            url: SecretString::from("redis://:secret@cache:6379"),
        };
        assert!(!format!("{config:?}").contains("secret@cache"));
    }
}
