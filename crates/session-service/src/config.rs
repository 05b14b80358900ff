//! Session Service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::config::{DatabaseConfig, ObservabilityConfig, RedisConfig, DEFAULT_DB_MAX_CONNECTIONS};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default service instance ID prefix.
pub const DEFAULT_SERVICE_ID_PREFIX: &str = "session";

/// Session Service configuration.
#[derive(Clone)]
pub struct Config {
    /// Postgres connection and pool size.
    pub database: DatabaseConfig,

    /// Redis bus connection.
    pub redis: RedisConfig,

    /// Shared secret for HS256 tokens issued by the identity provider.
    pub jwt_secret: SecretString,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Unique identifier for this instance. Used as the bus publisher label.
    pub service_id: String,

    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database", &self.database)
            .field("redis", &self.redis)
            .field("jwt_secret", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("service_id", &self.service_id)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid database pool size: {0}")]
    InvalidPoolSize(String),

    #[error("Invalid boolean for {name}: {value}")]
    InvalidBool { name: String, value: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |name: &str| {
            vars.get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
        };

        let database_url = required("DATABASE_URL")?;
        let redis_url = required("REDIS_URL")?;
        let jwt_secret = required("IDP_JWT_SECRET")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let service_id = vars.get("SERVICE_ID").cloned().unwrap_or_else(|| {
            format!("{}-{}", DEFAULT_SERVICE_ID_PREFIX, uuid::Uuid::new_v4())
        });

        let max_connections = match vars.get("DB_MAX_CONNECTIONS") {
            Some(value) => {
                let parsed: u32 = value.parse().map_err(|e| {
                    ConfigError::InvalidPoolSize(format!(
                        "DB_MAX_CONNECTIONS must be a valid integer, got '{value}': {e}"
                    ))
                })?;
                if parsed == 0 {
                    return Err(ConfigError::InvalidPoolSize(
                        "DB_MAX_CONNECTIONS must be positive".to_string(),
                    ));
                }
                parsed
            }
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        let json_logs = match vars.get("LOG_JSON").map(String::as_str) {
            None | Some("") => false,
            Some("1" | "true" | "TRUE" | "yes") => true,
            Some("0" | "false" | "FALSE" | "no") => false,
            Some(other) => {
                return Err(ConfigError::InvalidBool {
                    name: "LOG_JSON".to_string(),
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database: DatabaseConfig {
                postgres_url: SecretString::from(database_url),
                max_connections,
            },
            redis: RedisConfig {
                url: SecretString::from(redis_url),
            },
            jwt_secret: SecretString::from(jwt_secret),
            bind_address,
            service_id,
            observability: ObservabilityConfig {
                json_logs,
                ..ObservabilityConfig::default()
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgres://parley:hunter2@db/parley".to_string(),
            ),
            (
                "REDIS_URL".to_string(),
                "redis://:cachepw@cache:6379".to_string(),
            ),
            ("IDP_JWT_SECRET".to_string(), "signing-secret".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_applies_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.database.max_connections, 10);
        assert!(config.service_id.starts_with("session-"));
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_reads_overrides() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("SERVICE_ID".to_string(), "session-a".to_string());
        vars.insert("DB_MAX_CONNECTIONS".to_string(), "4".to_string());
        vars.insert("LOG_JSON".to_string(), "true".to_string());

        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.service_id, "session-a");
        assert_eq!(config.database.max_connections, 4);
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_missing_required_vars() {
        for name in ["DATABASE_URL", "REDIS_URL", "IDP_JWT_SECRET"] {
            let mut vars = base_vars();
            vars.remove(name);
            let err = Config::from_vars(&vars).unwrap_err();
            assert!(
                matches!(&err, ConfigError::MissingEnvVar(missing) if missing == name),
                "expected missing {name}, got {err}"
            );
        }
    }

    #[test]
    fn test_invalid_pool_size_rejected() {
        let mut vars = base_vars();
        vars.insert("DB_MAX_CONNECTIONS".to_string(), "zero".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidPoolSize(_))
        ));

        vars.insert("DB_MAX_CONNECTIONS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidPoolSize(_))
        ));
    }

    #[test]
    fn test_invalid_log_json_rejected() {
        let mut vars = base_vars();
        vars.insert("LOG_JSON".to_string(), "maybe".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidBool { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");

        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("cachepw"));
        assert!(!debug.contains("signing-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
