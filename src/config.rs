use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,
    pub database_max_connections: u32,
    pub database_busy_timeout: Duration,

    // Web Server
    pub web_host: String,
    pub web_port: u16,

    // Cache
    pub cache_ttl: Duration,

    // Bootstrap administrator
    pub admin_username: Option<String>,
    pub admin_api_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/forums.sqlite")),
            database_max_connections: parse_env_u32("DATABASE_MAX_CONNECTIONS", 5)?,
            database_busy_timeout: Duration::from_secs(parse_env_u64(
                "DATABASE_BUSY_TIMEOUT_SECS",
                10,
            )?),

            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,

            cache_ttl: Duration::from_secs(parse_env_u64("CACHE_TTL_SECS", 300)?),

            admin_username: optional_env("ADMIN_USERNAME"),
            admin_api_token: optional_env("ADMIN_API_TOKEN"),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                name: "DATABASE_MAX_CONNECTIONS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "CACHE_TTL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        match (&self.admin_username, &self.admin_api_token) {
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar("ADMIN_USERNAME".to_string()));
            }
            (Some(name), Some(_)) if name.chars().count() > 32 => {
                return Err(ConfigError::InvalidValue {
                    name: "ADMIN_USERNAME".to_string(),
                    message: "must be at most 32 characters".to_string(),
                });
            }
            (_, Some(token)) if token.len() < 16 => {
                return Err(ConfigError::InvalidValue {
                    name: "ADMIN_API_TOKEN".to_string(),
                    message: "must be at least 16 characters".to_string(),
                });
            }
            _ => {}
        }
        Ok(())
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            database_path: PathBuf::from("./data/forums.sqlite"),
            database_max_connections: 5,
            database_busy_timeout: Duration::from_secs(10),
            web_host: "127.0.0.1".to_string(),
            web_port: 8080,
            cache_ttl: Duration::from_secs(60),
            admin_username: None,
            admin_api_token: None,
        }
    }

    #[test]
    fn test_validate_defaults() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_ttl() {
        let config = Config {
            cache_ttl: Duration::ZERO,
            ..base()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_empty_pool() {
        let config = Config {
            database_max_connections: 0,
            ..base()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { name, .. }) if name == "DATABASE_MAX_CONNECTIONS"
        ));
    }

    #[test]
    fn test_validate_admin_pairing() {
        let config = Config {
            admin_api_token: Some("0123456789abcdef0123".to_string()),
            ..base()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingEnvVar(name)) if name == "ADMIN_USERNAME"
        ));

        // A token is generated at startup when only the username is set.
        let config = Config {
            admin_username: Some("admin".to_string()),
            ..base()
        };
        assert!(config.validate().is_ok());

        let config = Config {
            admin_username: Some("admin".to_string()),
            admin_api_token: Some("short".to_string()),
            ..base()
        };
        assert!(config.validate().is_err());

        let config = Config {
            admin_username: Some("admin".to_string()),
            admin_api_token: Some("0123456789abcdef0123".to_string()),
            ..base()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_variables() {
        std::env::set_var("WEB_PORT", "9090");
        std::env::set_var("CACHE_TTL_SECS", "15");
        std::env::set_var("ADMIN_USERNAME", "");
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "12");
        std::env::set_var("DATABASE_BUSY_TIMEOUT_SECS", "3");
        let config = Config::from_env().unwrap();
        assert_eq!(config.web_port, 9090);
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.database_busy_timeout, Duration::from_secs(3));
        assert_eq!(config.cache_ttl, Duration::from_secs(15));
        assert_eq!(config.admin_username, None);

        std::env::set_var("WEB_PORT", "not-a-port");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::ParseInt { name, .. }) if name == "WEB_PORT"
        ));

        std::env::remove_var("WEB_PORT");
        std::env::remove_var("CACHE_TTL_SECS");
        std::env::remove_var("ADMIN_USERNAME");
        std::env::remove_var("DATABASE_MAX_CONNECTIONS");
        std::env::remove_var("DATABASE_BUSY_TIMEOUT_SECS");
    }

    #[test]
    fn test_parse_defaults() {
        assert_eq!(parse_env_u16("PULSAR_NONEXISTENT_VAR", 42).unwrap(), 42);
        assert_eq!(parse_env_u64("PULSAR_NONEXISTENT_VAR", 7).unwrap(), 7);
        assert_eq!(parse_env_u32("PULSAR_NONEXISTENT_VAR", 3).unwrap(), 3);
    }
}
