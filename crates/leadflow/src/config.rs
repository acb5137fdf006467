use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::{DatabaseConfig, DatabaseType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Full,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Full
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_type = match lookup("DATABASE_TYPE")
            .unwrap_or_else(|| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "sqlite" => DatabaseType::Sqlite,
            "memory" => DatabaseType::Memory,
            other => {
                return Err(crate::Error::Config(format!(
                    "Unsupported DATABASE_TYPE: {}",
                    other
                )))
            }
        };

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                crate::Error::Config(format!("Invalid DATABASE_MAX_CONNECTIONS: {}", raw))
            })?,
            None => 5,
        };

        let format = match lookup("LOG_FORMAT")
            .unwrap_or_else(|| "full".to_string())
            .to_lowercase()
            .as_str()
        {
            "compact" => LogFormat::Compact,
            _ => LogFormat::Full,
        };

        let config = Config {
            database: DatabaseConfig {
                db_type,
                sqlite_path: match db_type {
                    DatabaseType::Sqlite => lookup("SQLITE_PATH")
                        .map(PathBuf::from)
                        .or_else(|| Some(PathBuf::from("data/leadflow.db"))),
                    DatabaseType::Memory => None,
                },
                max_connections,
            },
            logging: LoggingConfig {
                level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                format,
            },
        };

        config
            .database
            .validate()
            .map_err(crate::Error::Config)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> crate::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database.db_type, DatabaseType::Sqlite);
        assert_eq!(
            config.database.sqlite_path,
            Some(PathBuf::from("data/leadflow.db"))
        );
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Full);
    }

    #[test]
    fn test_memory_store_has_no_path() {
        let config = load(&[("DATABASE_TYPE", "Memory"), ("LOG_FORMAT", "compact")]).unwrap();
        assert_eq!(config.database.db_type, DatabaseType::Memory);
        assert!(config.database.sqlite_path.is_none());
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("DATABASE_TYPE", "postgres")]).is_err());
        assert!(load(&[("DATABASE_MAX_CONNECTIONS", "many")]).is_err());
        assert!(load(&[("DATABASE_MAX_CONNECTIONS", "0")]).is_err());
    }
}
